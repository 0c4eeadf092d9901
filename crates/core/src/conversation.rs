//! Conversation-related types.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use sidekick_model::{ModelMessage, ToolCallRequest, ToolCallResult};
use uuid::Uuid;

/// The criterion used when the caller supplies an empty one.
pub const DEFAULT_SUCCESS_CRITERIA: &str =
    "The answer should be clear and accurate.";

/// Identifies a conversation for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(Uuid);

impl ConversationId {
    /// Generates a new random identifier.
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConversationId {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The speaker of a [`TranscriptEntry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human user.
    User,
    /// The assistant, including the evaluator commentary.
    Assistant,
}

/// An item of the history that callers display and pass back in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Who said it.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl TranscriptEntry {
    /// Creates a user entry.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant entry.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A message in the conversation state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// The worker directive. A conversation holds at most one of these.
    System(String),
    /// A user input.
    User(String),
    /// A worker turn or an evaluator commentary.
    Assistant {
        /// The text content, empty for tool-call-only turns.
        content: String,
        /// Tool calls requested in this turn.
        tool_calls: Vec<ToolCallRequest>,
    },
    /// The textual output of one tool call.
    ToolResult {
        /// The id of the tool call this result answers.
        id: String,
        /// The name of the tool that was requested.
        name: String,
        /// The output, or an `Error: ...` text.
        content: String,
    },
}

impl Message {
    /// Creates a text-only assistant message.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: vec![],
        }
    }

    /// Returns the tool calls of an assistant message, or an empty slice
    /// for every other kind.
    #[inline]
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub(crate) fn to_model_message(&self) -> ModelMessage {
        match self {
            Self::System(content) => ModelMessage::System(content.clone()),
            Self::User(content) => ModelMessage::User(content.clone()),
            Self::Assistant {
                content,
                tool_calls,
            } => ModelMessage::Assistant {
                content: content.clone(),
                tool_calls: tool_calls.clone(),
            },
            Self::ToolResult { id, content, .. } => {
                ModelMessage::Tool(ToolCallResult {
                    id: id.clone(),
                    content: content.clone(),
                })
            }
        }
    }
}

impl From<&TranscriptEntry> for Message {
    #[inline]
    fn from(entry: &TranscriptEntry) -> Self {
        match entry.role {
            Role::User => Self::User(entry.content.clone()),
            Role::Assistant => Self::assistant(entry.content.clone()),
        }
    }
}

/// The state of one conversation, owned by its
/// [`Supervisor`](crate::Supervisor).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub(crate) messages: Vec<Message>,
    pub(crate) success_criteria: String,
    pub(crate) feedback_on_work: Option<String>,
    pub(crate) success_criteria_met: bool,
    pub(crate) user_input_needed: bool,
}

impl ConversationState {
    /// Returns the messages in order.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the success criteria of the current superstep.
    #[inline]
    pub fn success_criteria(&self) -> &str {
        &self.success_criteria
    }

    /// Returns the feedback of the latest evaluation, if any.
    #[inline]
    pub fn feedback_on_work(&self) -> Option<&str> {
        self.feedback_on_work.as_deref()
    }

    /// Returns whether the evaluator judged the criteria met.
    #[inline]
    pub fn success_criteria_met(&self) -> bool {
        self.success_criteria_met
    }

    /// Returns whether the evaluator asked for user input.
    #[inline]
    pub fn user_input_needed(&self) -> bool {
        self.user_input_needed
    }

    /// Prepares the state for a new superstep.
    ///
    /// The caller's history is only used to seed a conversation that has
    /// no messages yet. Evaluation results of the previous superstep are
    /// discarded.
    pub(crate) fn begin_superstep(
        &mut self,
        user_message: &str,
        success_criteria: &str,
        history: &[TranscriptEntry],
    ) {
        if self.messages.is_empty() {
            self.messages.extend(history.iter().map(Message::from));
        }
        self.messages.push(Message::User(user_message.to_owned()));

        self.success_criteria = if success_criteria.trim().is_empty() {
            DEFAULT_SUCCESS_CRITERIA.to_owned()
        } else {
            success_criteria.to_owned()
        };
        self.feedback_on_work = None;
        self.success_criteria_met = false;
        self.user_input_needed = false;
    }

    /// Replaces the directive in place, or prepends it if there is none.
    pub(crate) fn upsert_directive(&mut self, directive: String) {
        let existing = self
            .messages
            .iter_mut()
            .find(|msg| matches!(msg, Message::System(_)));
        match existing {
            Some(msg) => *msg = Message::System(directive),
            None => self.messages.insert(0, Message::System(directive)),
        }
    }

    /// Returns the last message if it is an assistant message.
    #[inline]
    pub(crate) fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .last()
            .filter(|msg| matches!(msg, Message::Assistant { .. }))
    }

    #[inline]
    pub(crate) fn model_messages(&self) -> Vec<ModelMessage> {
        self.messages.iter().map(Message::to_model_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_directive() {
        let mut state = ConversationState::default();
        state.messages.push(Message::User("Hi".to_owned()));

        state.upsert_directive("first".to_owned());
        assert_eq!(state.messages[0], Message::System("first".to_owned()));

        state.messages.push(Message::assistant("Hello"));
        state.upsert_directive("second".to_owned());
        let directives: Vec<_> = state
            .messages
            .iter()
            .filter(|msg| matches!(msg, Message::System(_)))
            .collect();
        assert_eq!(directives, [&Message::System("second".to_owned())]);
        assert_eq!(state.messages.len(), 3);
    }

    #[test]
    fn test_begin_superstep() {
        let history = [
            TranscriptEntry::user("Hi"),
            TranscriptEntry::assistant("Hello!"),
        ];

        let mut state = ConversationState {
            feedback_on_work: Some("too vague".to_owned()),
            success_criteria_met: true,
            user_input_needed: true,
            ..Default::default()
        };
        state.begin_superstep("2+2", "  ", &history);
        assert_eq!(
            state.messages,
            [
                Message::User("Hi".to_owned()),
                Message::assistant("Hello!"),
                Message::User("2+2".to_owned()),
            ]
        );
        assert_eq!(state.success_criteria, DEFAULT_SUCCESS_CRITERIA);
        assert_eq!(state.feedback_on_work, None);
        assert!(!state.success_criteria_met);
        assert!(!state.user_input_needed);

        // History is ignored once the conversation has messages.
        state.begin_superstep("3+3", "Be brief", &history);
        assert_eq!(state.messages.len(), 4);
        assert_eq!(state.success_criteria, "Be brief");
    }

    #[test]
    fn test_transcript_entry_serde() {
        let entry = TranscriptEntry::assistant("4");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "role": "assistant", "content": "4" })
        );
    }

    #[test]
    fn test_conversation_id_serde() {
        let id = ConversationId::new();
        let value = serde_json::to_value(id).unwrap();
        assert_eq!(value, serde_json::json!(id.to_string()));
        let parsed: ConversationId = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, id);
    }
}
