//! A batteries-included Sidekick with web search, a calculator and push
//! notifications.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring a supervised agent into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod session;
pub mod tools;

pub use config::{Config, ConfigError};
pub use session::{DEFAULT_SESSION_CRITERIA, Reply, Session, SessionBuilder};

/// Re-exports of [`sidekick_core`] crate.
pub mod core {
    pub use sidekick_core::*;
}
