use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::ModelProviderError;

/// A response from the model provider.
pub trait ModelResponse: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Polls for the next streamed event of the reply.
    ///
    /// Text arrives as [`ModelResponseEvent::MessageDelta`] pieces, each
    /// requested tool call as one [`ModelResponseEvent::ToolCall`], and the
    /// stream ends with exactly one [`ModelResponseEvent::Completed`]
    /// followed by `Ok(None)`. Polling again after `Ok(None)` keeps
    /// returning `Ok(None)`.
    ///
    /// An `Err` ends the reply early. Consumers drop whatever they have
    /// collected so far.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// Why the model stopped producing the reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// The reply ends with tool calls the worker must run first.
    ToolCalls,
    /// The reply is a final answer.
    Stop,
}

/// A tool invocation requested by the worker model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Identifier echoed back in the matching tool result.
    pub id: String,
    /// Name of a registered tool.
    pub name: String,
    /// The arguments to pass to the tool, usually a JSON object.
    pub arguments: Value,
}

/// One streamed piece of a model reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// The reply is complete.
    Completed(ModelFinishReason),
    /// A piece of reply text.
    MessageDelta(String),
    /// A fully assembled tool call.
    ToolCall(ToolCallRequest),
}
