use sidekick_model::ToolCallRequest;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::{Error, ToolRegistry, ToolResult};
use crate::conversation::Message;

/// A spawned tool call that is aborted when dropped unfinished.
struct ToolTask(JoinHandle<ToolResult>);

impl Drop for ToolTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs every requested tool call and returns one tool result message per
/// call, in request order.
///
/// Calls run concurrently. Failures of any kind, including unknown tools
/// and panics, become `Error: <reason>` texts. Dropping the returned
/// future aborts the calls still running.
pub(crate) async fn run_tool_calls(
    registry: &ToolRegistry,
    requests: &[ToolCallRequest],
) -> Vec<Message> {
    let tasks: Vec<Option<ToolTask>> = requests
        .iter()
        .map(|req| {
            let Some(tool) = registry.get(&req.name) else {
                warn!("tool not found: {}", req.name);
                return None;
            };
            trace!("spawning a tool ({}) with args: {:?}", req.id, req.arguments);
            let fut = tool.execute(req.arguments.clone());
            let span = debug_span!("tool execute", name = %req.name, id = %req.id);
            Some(ToolTask(tokio::spawn(fut.instrument(span))))
        })
        .collect();

    let mut results = Vec::with_capacity(requests.len());
    for (req, task) in requests.iter().zip(tasks) {
        let result = match task {
            Some(mut task) => (&mut task.0).await.unwrap_or_else(|err| {
                error!("tool `{}` did not finish: {err}", req.name);
                Err(Error::execution_error()
                    .with_reason(format!("tool `{}` crashed", req.name)))
            }),
            None => Err(Error::unknown_tool(&req.name)),
        };
        let content = match result {
            Ok(output) => output,
            Err(err) => {
                debug!("tool `{}` failed: {}", req.name, err.reason());
                err.to_string()
            }
        };
        results.push(Message::ToolResult {
            id: req.id.clone(),
            name: req.name.clone(),
            content,
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use serde::Deserialize;
    use serde_json::{Value, json};

    use super::*;
    use crate::tool::Tool;

    static SCHEMA: Value = Value::Null;

    #[derive(Deserialize)]
    struct SleepInput {
        millis: u64,
        text: String,
    }

    struct SleepTool;

    impl Tool for SleepTool {
        type Input = SleepInput;

        fn name(&self) -> &str {
            "sleep"
        }

        fn description(&self) -> &str {
            "Sleeps, then echoes the text"
        }

        fn parameter_schema(&self) -> &Value {
            &SCHEMA
        }

        fn execute(
            &self,
            input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            async move {
                tokio::time::sleep(Duration::from_millis(input.millis)).await;
                if input.text == "panic" {
                    panic!("asked to panic");
                }
                Ok(input.text)
            }
        }
    }

    #[derive(Deserialize)]
    struct NotifyInput {
        millis: u64,
    }

    /// Raises a flag after a delay, like a notification that goes out late.
    struct NotifyTool(Arc<AtomicBool>);

    impl Tool for NotifyTool {
        type Input = NotifyInput;

        fn name(&self) -> &str {
            "notify"
        }

        fn description(&self) -> &str {
            "Raises a flag after a delay"
        }

        fn parameter_schema(&self) -> &Value {
            &SCHEMA
        }

        fn execute(
            &self,
            input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            let sent = Arc::clone(&self.0);
            async move {
                tokio::time::sleep(Duration::from_millis(input.millis)).await;
                sent.store(true, Ordering::SeqCst);
                Ok("sent".to_owned())
            }
        }
    }

    fn call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_owned(),
            name: name.to_owned(),
            arguments,
        }
    }

    fn contents(messages: &[Message]) -> Vec<(&str, &str)> {
        messages
            .iter()
            .map(|msg| match msg {
                Message::ToolResult { id, content, .. } => {
                    (id.as_str(), content.as_str())
                }
                other => panic!("unexpected message: {other:?}"),
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_request_order() {
        let registry = ToolRegistry::builder().with_tool(SleepTool).build();
        let requests = [
            call("a", "sleep", json!({ "millis": 30, "text": "slow" })),
            call("b", "sleep", json!({ "millis": 10, "text": "fast" })),
            call("c", "sleep", json!({ "millis": 20, "text": "medium" })),
        ];
        let results = run_tool_calls(&registry, &requests).await;
        assert_eq!(
            contents(&results),
            [("a", "slow"), ("b", "fast"), ("c", "medium")]
        );
    }

    #[tokio::test]
    async fn test_failures_become_text() {
        let registry = ToolRegistry::builder().with_tool(SleepTool).build();
        let requests = [
            call("a", "fly", json!({})),
            call("b", "sleep", json!({ "millis": "soon" })),
            call("c", "sleep", json!({ "millis": 0, "text": "panic" })),
            call("d", "sleep", json!({ "millis": 0, "text": "ok" })),
        ];
        let results = run_tool_calls(&registry, &requests).await;
        let contents = contents(&results);
        assert_eq!(contents.len(), 4);
        assert_eq!(contents[0], ("a", "Error: unknown tool `fly`"));
        assert!(contents[1].1.starts_with("Error: invalid arguments"));
        assert_eq!(contents[2], ("c", "Error: tool `sleep` crashed"));
        assert_eq!(contents[3], ("d", "ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_aborts_tools() {
        let sent = Arc::new(AtomicBool::new(false));
        let registry = ToolRegistry::builder()
            .with_tool(NotifyTool(Arc::clone(&sent)))
            .build();
        let requests = [call("a", "notify", json!({ "millis": 50 }))];

        let run = run_tool_calls(&registry, &requests);
        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), run).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!sent.load(Ordering::SeqCst));

        let results = run_tool_calls(&registry, &requests).await;
        assert_eq!(contents(&results), [("a", "sent")]);
        assert!(sent.load(Ordering::SeqCst));
    }
}
