//! A backend-neutral protocol between the supervision loop and LLMs.
//!
//! The worker and the evaluator talk to their models only through the
//! types in this crate, so any chat-completion backend (a hosted API, a
//! local server, or a scripted fake in tests) can sit behind them without
//! touching the loop itself.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
