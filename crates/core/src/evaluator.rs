use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sidekick_model::{ModelMessage, ModelRequest, ResponseFormat};

use crate::conversation::{ConversationState, Message};
use crate::error::Error;
use crate::model_client::ModelClient;

const SYSTEM_PROMPT: &str = "You are an evaluator that decides if the Assistant satisfied the success criteria. \
Provide succinct feedback. Say if criteria are met, and whether user input is needed.";

/// The evaluator's judgement of the latest answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Verdict {
    /// Feedback on the assistant's response.
    #[schemars(description = "Feedback on the assistant's response")]
    pub feedback: String,
    /// Whether the success criteria have been met.
    #[schemars(description = "Whether the success criteria have been met")]
    pub success_criteria_met: bool,
    /// Whether the user has to answer before the work can go on.
    #[schemars(
        description = "True if more input is needed from the user, or clarifications, or the assistant is stuck"
    )]
    pub user_input_needed: bool,
}

impl Verdict {
    /// Parses the raw evaluator output. Only a bare JSON object with
    /// exactly the verdict fields is accepted.
    pub fn parse(output: &str) -> Result<Self, Error> {
        serde_json::from_str(output.trim()).map_err(|err| {
            warn!("rejecting evaluator output: {err}");
            Error::StructuredOutput(format!("{err}"))
        })
    }

    /// Folds the verdict into the state and appends the commentary.
    pub(crate) fn apply(self, state: &mut ConversationState) {
        state.messages.push(Message::assistant(format!(
            "Evaluator Feedback: {}",
            self.feedback
        )));
        state.feedback_on_work = Some(self.feedback);
        state.success_criteria_met = self.success_criteria_met;
        state.user_input_needed = self.user_input_needed;
    }
}

fn verdict_format() -> ResponseFormat {
    let mut schema = schema_for!(Verdict).to_value();
    if let Value::Object(map) = &mut schema {
        map.remove("$schema");
    }
    ResponseFormat {
        name: "evaluator_output".to_owned(),
        schema,
    }
}

/// Renders the user and assistant turns for the evaluator.
pub(crate) fn format_conversation(messages: &[Message]) -> String {
    let mut convo = String::from("Conversation history:\n\n");
    for msg in messages {
        match msg {
            Message::User(content) => {
                convo.push_str(&format!("User: {content}\n"));
            }
            Message::Assistant { content, .. } => {
                let content =
                    if content.is_empty() { "[Tools use]" } else { content };
                convo.push_str(&format!("Assistant: {content}\n"));
            }
            Message::System(_) | Message::ToolResult { .. } => {}
        }
    }
    convo
}

/// Asks the evaluator model to judge the last assistant message.
pub(crate) async fn run_evaluator(
    client: &ModelClient,
    state: &ConversationState,
) -> Result<Verdict, Error> {
    let last_response = match state.last_assistant() {
        Some(Message::Assistant { content, .. }) => content.as_str(),
        _ => "",
    };
    let user_message = format!(
        "\n{}\n\nSuccess criteria:\n{}\n\nLast Assistant response:\n{last_response}\n",
        format_conversation(&state.messages),
        state.success_criteria,
    );

    let req = ModelRequest {
        messages: vec![
            ModelMessage::System(SYSTEM_PROMPT.to_owned()),
            ModelMessage::User(user_message),
        ],
        tools: vec![],
        response_format: Some(verdict_format()),
    };
    let resp = client.send_request(req).await?;
    let verdict = Verdict::parse(&resp.content)?;
    debug!(
        met = verdict.success_criteria_met,
        input_needed = verdict.user_input_needed,
        "evaluator verdict"
    );
    Ok(verdict)
}
