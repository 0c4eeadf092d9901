use chrono::{DateTime, Local};
use sidekick_model::ModelRequest;

use crate::conversation::{ConversationState, Message};
use crate::error::Error;
use crate::model_client::ModelClient;
use crate::tool::ToolRegistry;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Builds the worker directive for the given criteria and feedback.
pub(crate) fn build_directive(
    success_criteria: &str,
    feedback_on_work: Option<&str>,
    now: DateTime<Local>,
) -> String {
    let mut directive = format!(
        "You are a helpful assistant with access to exactly three tools:
1) search — DuckDuckGo search that returns result snippets only (no browsing).
2) calculate — a safe calculator for arithmetic expressions.
3) send_push_notification — sends a push notification to the user.

Rules:
- ONLY call send_push_notification if the user explicitly asks for a push/notification.
- If external info is needed, use 'search'. If math is needed, use 'calculate'.

Current date and time: {}

Success criteria:
{success_criteria}

Reply with a direct answer, or ask a clear question if you truly need clarification.
",
        now.format(TIME_FORMAT)
    );

    if let Some(feedback) = feedback_on_work.filter(|f| !f.is_empty()) {
        directive.push_str(&format!(
            "

Previously you attempted a final answer but it was rejected.
Feedback:
{feedback}

Use this feedback to continue and meet the success criteria (or ask a clarifying question if necessary).
"
        ));
    }
    directive
}

/// Installs a fresh directive, asks the worker model and returns its turn.
///
/// The returned message is not appended to the state.
pub(crate) async fn run_worker(
    client: &ModelClient,
    registry: &ToolRegistry,
    state: &mut ConversationState,
) -> Result<Message, Error> {
    let directive = build_directive(
        &state.success_criteria,
        state.feedback_on_work.as_deref(),
        Local::now(),
    );
    state.upsert_directive(directive);

    let req = ModelRequest {
        messages: state.model_messages(),
        tools: registry.definitions(),
        response_format: None,
    };
    let resp = client.send_request(req).await?;
    debug!(
        "worker replied with {} chars and {} tool calls ({:?})",
        resp.content.len(),
        resp.tool_calls.len(),
        resp.finish_reason
    );
    if resp.finish_reason.is_none() {
        warn!("worker reply ended without a finish reason");
    }

    Ok(Message::Assistant {
        content: resp.content,
        tool_calls: resp.tool_calls,
    })
}
