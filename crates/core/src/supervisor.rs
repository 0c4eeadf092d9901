mod builder;
mod stage;

use std::sync::Arc;

use tracing::Instrument;

use crate::conversation::{
    ConversationId, ConversationState, Message, TranscriptEntry,
};
use crate::error::Error;
use crate::evaluator::run_evaluator;
use crate::model_client::ModelClient;
use crate::tool::ToolRegistry;
use crate::tool::runner::run_tool_calls;
use crate::worker::run_worker;
pub use builder::SidekickBuilder;
pub use stage::Stage;
use stage::{route_after_evaluation, route_after_worker};

struct Shared {
    worker: ModelClient,
    evaluator: ModelClient,
    tools: ToolRegistry,
    max_evaluations: Option<usize>,
}

/// A configured agent: the worker and evaluator models plus the tools.
///
/// `Sidekick` is cheap to clone. Every conversation gets its own
/// [`Supervisor`], and conversations only share the immutable parts held
/// here.
#[derive(Clone)]
pub struct Sidekick {
    shared: Arc<Shared>,
}

impl Sidekick {
    /// Returns the registered tools.
    #[inline]
    pub fn tools(&self) -> &ToolRegistry {
        &self.shared.tools
    }

    /// Starts a new, empty conversation.
    pub fn start_conversation(&self) -> Supervisor {
        let id = ConversationId::new();
        debug!("starting conversation {id}");
        Supervisor {
            id,
            sidekick: self.clone(),
            state: ConversationState::default(),
        }
    }
}

/// Drives one conversation through worker, tool and evaluator steps.
///
/// A superstep borrows the supervisor mutably, so a conversation never runs
/// two supersteps at once.
pub struct Supervisor {
    id: ConversationId,
    sidekick: Sidekick,
    state: ConversationState,
}

impl Supervisor {
    /// Returns the conversation identifier.
    #[inline]
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Returns the state as of the last completed superstep.
    #[inline]
    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Handles one user message until the evaluator accepts the answer or
    /// asks for user input.
    ///
    /// A conversation without messages is seeded from `history`. Returns
    /// `history` extended with the user message, the final assistant reply
    /// and the evaluator commentary.
    ///
    /// On error the stored state is left untouched. Dropping the future has
    /// the same effect.
    pub async fn run_superstep(
        &mut self,
        user_message: &str,
        success_criteria: &str,
        history: &[TranscriptEntry],
    ) -> Result<Vec<TranscriptEntry>, Error> {
        let span = info_span!("superstep", conversation = %self.id);
        let mut state = self.state.clone();
        state.begin_superstep(user_message, success_criteria, history);

        self.drive(&mut state).instrument(span).await?;

        // The loop only terminates right after an evaluation, so the
        // commentary is the last message and the reply precedes it.
        let [.., reply, commentary] = state.messages.as_slice() else {
            unreachable!("a finished superstep has at least two messages");
        };
        let mut new_history = Vec::with_capacity(history.len() + 3);
        new_history.extend_from_slice(history);
        new_history.push(TranscriptEntry::user(user_message));
        new_history.push(TranscriptEntry::assistant(text_of(reply)));
        new_history.push(TranscriptEntry::assistant(text_of(commentary)));

        self.state = state;
        Ok(new_history)
    }

    async fn drive(&self, state: &mut ConversationState) -> Result<(), Error> {
        let shared = &self.sidekick.shared;
        let mut stage = Stage::Worker;
        let mut evaluations = 0;
        loop {
            trace!("entering {stage:?}");
            stage = match stage {
                Stage::Worker => {
                    let turn =
                        run_worker(&shared.worker, &shared.tools, state).await?;
                    state.messages.push(turn);
                    route_after_worker(state)
                }
                Stage::Tools => {
                    let requests = state
                        .last_assistant()
                        .map(|msg| msg.tool_calls().to_vec())
                        .unwrap_or_default();
                    let results = run_tool_calls(&shared.tools, &requests).await;
                    state.messages.extend(results);
                    Stage::Worker
                }
                Stage::Evaluator => {
                    let verdict = run_evaluator(&shared.evaluator, state).await?;
                    evaluations += 1;
                    verdict.apply(state);

                    let next = route_after_evaluation(state);
                    let limit_hit = shared
                        .max_evaluations
                        .is_some_and(|max| evaluations >= max);
                    if next == Stage::Worker && limit_hit {
                        warn!("giving up after {evaluations} rejected answers");
                        return Err(Error::EvaluationLimitExceeded(evaluations));
                    }
                    next
                }
                Stage::Terminated => break,
            };
        }
        info!(
            met = state.success_criteria_met,
            input_needed = state.user_input_needed,
            evaluations,
            "superstep finished"
        );
        Ok(())
    }
}

#[inline]
fn text_of(msg: &Message) -> String {
    match msg {
        Message::System(content) | Message::User(content) => content.clone(),
        Message::Assistant { content, .. } => content.clone(),
        Message::ToolResult { content, .. } => content.clone(),
    }
}
