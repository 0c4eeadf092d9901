use std::sync::Arc;

use sidekick_core::{
    ConversationId, Error, SidekickBuilder, Supervisor, TranscriptEntry,
};
use sidekick_model::ModelProvider;
use sidekick_openai_model::OpenAIProvider;

use crate::config::Config;
use crate::tools::*;

/// The success criterion of a session unless another one is set.
pub const DEFAULT_SESSION_CRITERIA: &str = "Answer clearly and correctly.";

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    sidekick_builder: SidekickBuilder,
    success_criteria: String,
    pushover_token: Option<String>,
    pushover_user: Option<String>,
    search_provider: Option<Arc<dyn SearchProvider>>,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        Self {
            sidekick_builder: SidekickBuilder::with_model_provider(provider),
            success_criteria: DEFAULT_SESSION_CRITERIA.to_owned(),
            pushover_token: None,
            pushover_user: None,
            search_provider: None,
        }
    }

    /// Creates a session builder with OpenAI-compatible providers and the
    /// Pushover credentials from `config`.
    pub fn from_config(config: &Config) -> Self {
        let worker = OpenAIProvider::new(config.worker_config());
        let evaluator = OpenAIProvider::new(config.evaluator_config());
        info!(
            worker = worker.config().model(),
            evaluator = evaluator.config().model(),
            "using OpenAI-compatible models"
        );
        Self::with_model_provider(worker)
            .with_evaluator_provider(evaluator)
            .with_pushover(
                config.pushover_token.clone(),
                config.pushover_user.clone(),
            )
    }

    /// Uses a separate model provider for the evaluator.
    #[inline]
    pub fn with_evaluator_provider<M: ModelProvider + 'static>(
        mut self,
        provider: M,
    ) -> Self {
        self.sidekick_builder =
            self.sidekick_builder.with_evaluator_provider(provider);
        self
    }

    /// Sets the success criterion sent with every message.
    #[inline]
    pub fn with_success_criteria<S: Into<String>>(
        mut self,
        criteria: S,
    ) -> Self {
        self.success_criteria = criteria.into();
        self
    }

    /// Aborts a message once the evaluator has rejected `max` answers.
    #[inline]
    pub fn with_max_evaluations(mut self, max: usize) -> Self {
        self.sidekick_builder = self.sidekick_builder.max_evaluations(max);
        self
    }

    /// Sets the Pushover credentials of the push tool.
    #[inline]
    pub fn with_pushover(
        mut self,
        token: Option<String>,
        user: Option<String>,
    ) -> Self {
        self.pushover_token = token;
        self.pushover_user = user;
        self
    }

    /// Replaces the DuckDuckGo backend of the search tool.
    #[inline]
    pub fn with_search_provider(
        mut self,
        provider: Arc<dyn SearchProvider>,
    ) -> Self {
        self.search_provider = Some(provider);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let search = match self.search_provider {
            Some(provider) => SearchTool::with_provider(provider),
            None => SearchTool::new(),
        };
        let push = PushTool::new(self.pushover_token, self.pushover_user);
        if !push.is_configured() {
            warn!("Pushover credentials missing, push notifications disabled");
        }
        let sidekick = self
            .sidekick_builder
            .with_tool(search)
            .with_tool(CalculateTool::new())
            .with_tool(push)
            .build();

        Session {
            supervisor: sidekick.start_conversation(),
            history: vec![],
            success_criteria: self.success_criteria,
        }
    }
}

/// The outcome of one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// The final answer of the worker.
    pub answer: String,
    /// The commentary of the evaluator, starting with `Evaluator Feedback:`.
    pub feedback: String,
    /// Whether the evaluator accepted the answer.
    pub success_criteria_met: bool,
    /// Whether the worker is waiting for an answer from the user.
    pub user_input_needed: bool,
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session keeps the visible transcript and hands it to the
/// [`Supervisor`] with every message.
pub struct Session {
    supervisor: Supervisor,
    history: Vec<TranscriptEntry>,
    success_criteria: String,
}

impl Session {
    /// Sends a message to the session and waits for the supervised reply.
    ///
    /// On error the transcript is left as it was.
    pub async fn send_message(&mut self, message: &str) -> Result<Reply, Error> {
        let history = self
            .supervisor
            .run_superstep(message, &self.success_criteria, &self.history)
            .await?;
        let [.., answer, feedback] = history.as_slice() else {
            unreachable!("a superstep appends three entries");
        };
        let state = self.supervisor.state();
        let reply = Reply {
            answer: answer.content.clone(),
            feedback: feedback.content.clone(),
            success_criteria_met: state.success_criteria_met(),
            user_input_needed: state.user_input_needed(),
        };
        self.history = history;
        Ok(reply)
    }

    /// Returns the visible transcript.
    #[inline]
    pub fn history(&self) -> &[TranscriptEntry] {
        &self.history
    }

    /// Returns the conversation identifier.
    #[inline]
    pub fn id(&self) -> ConversationId {
        self.supervisor.id()
    }

    /// Returns the success criterion sent with every message.
    #[inline]
    pub fn success_criteria(&self) -> &str {
        &self.success_criteria
    }

    /// Changes the success criterion for the following messages.
    #[inline]
    pub fn set_success_criteria<S: Into<String>>(&mut self, criteria: S) {
        self.success_criteria = criteria.into();
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use sidekick_core::Role;
    use sidekick_model::{ErrorKind, ModelMessage, ToolCallRequest};
    use sidekick_test_model::{
        PresetEvent, PresetResponse, TestModelProvider,
    };

    use super::*;

    struct NoSearch;

    #[async_trait]
    impl SearchProvider for NoSearch {
        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<SearchResult>, SearchError> {
            Ok(vec![])
        }

        fn provider_name(&self) -> &'static str {
            "none"
        }
    }

    fn verdict(feedback: &str, met: bool, input_needed: bool) -> PresetResponse {
        PresetResponse::text(
            json!({
                "feedback": feedback,
                "success_criteria_met": met,
                "user_input_needed": input_needed,
            })
            .to_string(),
        )
    }

    fn session(
        worker: &TestModelProvider,
        evaluator: &TestModelProvider,
    ) -> Session {
        SessionBuilder::with_model_provider(worker.clone())
            .with_evaluator_provider(evaluator.clone())
            .with_search_provider(Arc::new(NoSearch))
            .build()
    }

    #[tokio::test]
    async fn test_calculate_with_builtin_tool() {
        let mut worker = TestModelProvider::default();
        let mut evaluator = TestModelProvider::default();
        worker.add_response(PresetResponse::with_events([
            PresetEvent::ToolCall(ToolCallRequest {
                id: "call_1".to_owned(),
                name: "calculate".to_owned(),
                arguments: json!({ "expression": "2 + 2*3" }),
            }),
        ]));
        worker.add_response(PresetResponse::text("8"));
        evaluator.add_response(verdict("Correct.", true, false));

        let mut session = session(&worker, &evaluator);
        let reply = session.send_message("2 + 2*3").await.unwrap();
        assert_eq!(reply.answer, "8");
        assert_eq!(reply.feedback, "Evaluator Feedback: Correct.");
        assert!(reply.success_criteria_met);
        assert!(!reply.user_input_needed);

        let requests = worker.requests();
        let tool_names: Vec<_> =
            requests[0].tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            tool_names,
            ["calculate", "search", "send_push_notification"]
        );
        let tool_output = requests[1].messages.iter().find_map(|msg| match msg {
            ModelMessage::Tool(result) => Some(result.content.as_str()),
            _ => None,
        });
        assert_eq!(tool_output, Some("8"));

        let criteria = evaluator.requests()[0]
            .messages
            .iter()
            .any(|msg| match msg {
                ModelMessage::User(content) => {
                    content.contains(DEFAULT_SESSION_CRITERIA)
                }
                _ => false,
            });
        assert!(criteria);
    }

    #[tokio::test]
    async fn test_history_accumulates() {
        let mut worker = TestModelProvider::default();
        let mut evaluator = TestModelProvider::default();
        worker.add_response(PresetResponse::text("Which city?"));
        evaluator.add_response(verdict("Needs the city.", false, true));
        worker.add_response(PresetResponse::text("Sunny in Oslo."));
        evaluator.add_response(verdict("Good.", true, false));

        let mut session = session(&worker, &evaluator);
        let reply = session.send_message("What's the weather?").await.unwrap();
        assert!(reply.user_input_needed);
        assert_eq!(session.history().len(), 3);

        session.set_success_criteria("Mention the city.");
        let reply = session.send_message("Oslo").await.unwrap();
        assert_eq!(reply.answer, "Sunny in Oslo.");

        let history = session.history();
        assert_eq!(history.len(), 6);
        assert_eq!(history[3].role, Role::User);
        assert_eq!(history[3].content, "Oslo");
        assert_eq!(history[5].content, "Evaluator Feedback: Good.");
    }

    #[tokio::test]
    async fn test_failure_keeps_history() {
        let mut worker = TestModelProvider::default();
        let evaluator = TestModelProvider::default();
        worker.add_failure(ErrorKind::Unavailable);

        let mut session = session(&worker, &evaluator);
        let err = session.send_message("hello").await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { .. }));
        assert!(session.history().is_empty());
    }
}
