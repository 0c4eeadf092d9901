use std::fmt::{self, Display};

use sidekick_model::ErrorKind as ModelErrorKind;

/// The model role that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelRole {
    /// The model producing answers and tool calls.
    Worker,
    /// The model judging answers.
    Evaluator,
}

impl Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRole::Worker => write!(f, "worker"),
            ModelRole::Evaluator => write!(f, "evaluator"),
        }
    }
}

/// Errors that abort a superstep.
///
/// The stored conversation state is left as it was before the superstep
/// whenever one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The worker or evaluator model failed to answer.
    #[error("{role} model is unavailable ({kind}): {message}")]
    BackendUnavailable {
        /// Which model failed.
        role: ModelRole,
        /// The kind reported by the provider.
        kind: ModelErrorKind,
        /// The provider's error message.
        message: String,
    },
    /// The evaluator output is not a conforming verdict.
    #[error("malformed evaluator output: {0}")]
    StructuredOutput(String),
    /// The evaluator rejected the answer more times than allowed.
    #[error("answer was rejected {0} times without meeting the criteria")]
    EvaluationLimitExceeded(usize),
}
