use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// The error type for a model provider.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A chat-completion backend that the worker and the evaluator sample
/// from.
///
/// Once the provider is created, it should behave like a stateless object.
/// One provider is shared by every conversation of a `Sidekick`, so it
/// must not keep per-conversation state, and it should be prepared for
/// being dropped anytime.
///
/// Retrying transient failures is the provider's own business. Whatever
/// error it finally returns aborts the current superstep.
pub trait ModelProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// The response type for this provider.
    type Response: ModelResponse<Error = Self::Error>;

    /// Sends a request to the model.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
