use crate::conversation::ConversationState;

/// The node the supervision loop runs next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Ask the worker model for an answer or tool calls.
    #[default]
    Worker,
    /// Run the tool calls of the last worker turn.
    Tools,
    /// Ask the evaluator model to judge the last answer.
    Evaluator,
    /// The superstep is over.
    Terminated,
}

/// Routes after a worker turn: tools if it requested any, else evaluation.
#[inline]
pub(crate) fn route_after_worker(state: &ConversationState) -> Stage {
    let wants_tools = state
        .last_assistant()
        .is_some_and(|msg| !msg.tool_calls().is_empty());
    if wants_tools {
        Stage::Tools
    } else {
        Stage::Evaluator
    }
}

/// Routes after an evaluation: stop when the criteria are met or the user
/// has to answer, else back to the worker.
#[inline]
pub(crate) fn route_after_evaluation(state: &ConversationState) -> Stage {
    if state.success_criteria_met || state.user_input_needed {
        Stage::Terminated
    } else {
        Stage::Worker
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sidekick_model::ToolCallRequest;

    use super::*;
    use crate::conversation::Message;

    #[test]
    fn test_route_after_worker() {
        let mut state = ConversationState::default();
        state.messages.push(Message::assistant("4"));
        assert_eq!(route_after_worker(&state), Stage::Evaluator);

        state.messages.push(Message::Assistant {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "call_1".to_owned(),
                name: "calculate".to_owned(),
                arguments: json!({ "expression": "2+2" }),
            }],
        });
        assert_eq!(route_after_worker(&state), Stage::Tools);
    }

    #[test]
    fn test_route_after_evaluation() {
        let cases = [
            (false, false, Stage::Worker),
            (true, false, Stage::Terminated),
            (false, true, Stage::Terminated),
            (true, true, Stage::Terminated),
        ];
        for (met, input_needed, expected) in cases {
            let state = ConversationState {
                success_criteria_met: met,
                user_input_needed: input_needed,
                ..Default::default()
            };
            assert_eq!(route_after_evaluation(&state), expected);
        }
    }
}
