use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use serde_json::Value;
use sidekick_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, ToolCall};

struct PartialState {
    sse: Sse,
    tool_calls: Vec<ToolCall>,
    // Indices of the tool calls that are fully received but not yet handed
    // out by `poll_next_event`.
    pending_tool_call_idx: VecDeque<usize>,
    // This field will be cleared after the response returns the complete event.
    pending_finish_reason: Option<ModelFinishReason>,
    // Set once the finish reason is staged, nothing is read afterwards.
    finished: bool,
}

impl PartialState {
    /// Merges a streamed tool call fragment into the calls received so far.
    fn merge_tool_call(&mut self, fragment: ToolCall) {
        let existing = match (fragment.index, &fragment.id) {
            (Some(index), _) => {
                self.tool_calls.iter().position(|t| t.index == Some(index))
            }
            // Without an index, a fragment carrying a new id starts a new
            // call, anything else continues the latest one.
            (None, Some(id)) => self
                .tool_calls
                .iter()
                .position(|t| t.id.as_deref() == Some(id.as_str())),
            (None, None) => self.tool_calls.len().checked_sub(1),
        };
        let Some(idx) = existing else {
            self.tool_calls.push(fragment);
            return;
        };

        // Patch the partial tool call.
        let partial = &mut self.tool_calls[idx];
        if let Some(id) = fragment.id {
            partial.id.get_or_insert(id);
        }
        if let Some(ty) = fragment.r#type {
            partial.r#type.get_or_insert(ty);
        }
        if let Some(function) = fragment.function {
            match partial.function {
                Some(ref mut partial_func) => {
                    if let Some(name) = function.name {
                        partial_func
                            .name
                            .get_or_insert_default()
                            .push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial_func
                            .arguments
                            .get_or_insert_default()
                            .push_str(&arguments);
                    }
                }
                None => partial.function = Some(function),
            }
        }
    }

    /// Stages every received tool call and the finish reason.
    fn finish(&mut self, reason: Option<&str>) {
        let finish_reason =
            if reason == Some("tool_calls") || !self.tool_calls.is_empty() {
                ModelFinishReason::ToolCalls
            } else {
                ModelFinishReason::Stop
            };
        self.pending_finish_reason = Some(finish_reason);
        self.pending_tool_call_idx.extend(0..self.tool_calls.len());
        self.finished = true;
    }

    fn make_tool_call_request(&self, idx: usize) -> ToolCallRequest {
        let tool_call = &self.tool_calls[idx];
        let id = tool_call
            .id
            .clone()
            .unwrap_or_else(|| format!("call_{idx}"));
        let name = tool_call
            .function
            .as_ref()
            .and_then(|f| f.name.clone())
            .unwrap_or_default();
        let arguments = tool_call
            .function
            .as_ref()
            .and_then(|f| f.arguments.as_deref())
            .filter(|args| !args.trim().is_empty())
            .map(|args| {
                serde_json::from_str::<Value>(args).unwrap_or_else(|err| {
                    warn!("malformed arguments for tool `{name}`: {err}");
                    Value::String(args.to_owned())
                })
            })
            .unwrap_or_else(|| Value::Object(Default::default()));
        ToolCallRequest {
            id,
            name,
            arguments,
        }
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            tool_calls: Default::default(),
            pending_tool_call_idx: Default::default(),
            pending_finish_reason: Default::default(),
            finished: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    let mut message_delta = None;

    // Tool calls and the finish reason are only handed out once the model
    // has stopped, so there is nothing more to read then.
    if !partial_state.finished {
        loop {
            let sse_event = match partial_state.sse.next_event().await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!("stream ended without a finish reason");
                    partial_state.finish(None);
                    break;
                }
                Err(err) => {
                    return Err(Error::new(
                        format!("{err:?}"),
                        ErrorKind::Unavailable,
                    ));
                }
            };
            trace!("got sse event: {sse_event}");
            if sse_event == "[DONE]" {
                debug!("stream done without a finish reason");
                partial_state.finish(None);
                break;
            }

            let mut chunk =
                serde_json::from_str::<ChatCompletionChunk>(&sse_event)
                    .map_err(|err| {
                        Error::new(format!("{err}"), ErrorKind::Other)
                    })?;

            let Some(choice) = chunk.choices.pop() else {
                // Usage-only chunks carry no choice.
                continue;
            };

            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    message_delta = Some(content);
                }
            }
            for tool_call in choice.delta.tool_calls.unwrap_or_default() {
                partial_state.merge_tool_call(tool_call);
            }

            // Some servers put the last delta and the finish reason in the
            // same chunk, so the delta is handled first.
            if let Some(finish_reason) = choice.finish_reason {
                partial_state.finish(Some(&finish_reason));
                break;
            }

            if message_delta.is_some() {
                break;
            }
        }
    }

    // The order of events are important. Always emit message delta first, then
    // emit pending tool calls, and finally emit pending finish reason if any.

    if let Some(message_delta) = message_delta {
        return Ok((
            Some(ModelResponseEvent::MessageDelta(message_delta)),
            partial_state,
        ));
    }

    if let Some(idx) = partial_state.pending_tool_call_idx.pop_front() {
        let request = partial_state.make_tool_call_request(idx);
        return Ok((Some(ModelResponseEvent::ToolCall(request)), partial_state));
    }

    if let Some(finish_reason) = partial_state.pending_finish_reason.take() {
        return Ok((
            Some(ModelResponseEvent::Completed(finish_reason)),
            partial_state,
        ));
    }

    Ok((None, partial_state))
}
