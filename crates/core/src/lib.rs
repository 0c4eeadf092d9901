//! The supervision loop of Sidekick.
//!
//! A superstep alternates between a worker model that answers or requests
//! tools, a tool runner, and an evaluator model that judges the answer
//! against a success criterion. It ends when the criterion is met or the
//! user has to answer a question.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod conversation;
mod error;
mod evaluator;
mod model_client;
mod supervisor;
pub mod tool;
mod worker;

pub use conversation::{ConversationId, Role, TranscriptEntry};
pub use error::{Error, ModelRole};
pub use evaluator::Verdict;
pub use supervisor::{Sidekick, SidekickBuilder, Stage, Supervisor};
