use std::sync::Arc;

use sidekick_model::ModelProvider;

use super::{Shared, Sidekick};
use crate::error::ModelRole;
use crate::model_client::ModelClient;
use crate::tool::{Tool, ToolRegistry, ToolRegistryBuilder};

/// [`Sidekick`] builder.
pub struct SidekickBuilder {
    worker: ModelClient,
    evaluator: Option<ModelClient>,
    tools: ToolRegistryBuilder,
    max_evaluations: Option<usize>,
}

impl SidekickBuilder {
    /// Creates a new builder with the model provider of the worker.
    ///
    /// The evaluator uses the same provider unless
    /// [`with_evaluator_provider`](Self::with_evaluator_provider) is called.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            worker: ModelClient::new(provider, ModelRole::Worker),
            evaluator: None,
            tools: ToolRegistry::builder(),
            max_evaluations: None,
        }
    }

    /// Uses a separate model provider for the evaluator.
    #[inline]
    pub fn with_evaluator_provider<P: ModelProvider + 'static>(
        mut self,
        provider: P,
    ) -> Self {
        self.evaluator = Some(ModelClient::new(provider, ModelRole::Evaluator));
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools = self.tools.with_tool(tool);
        self
    }

    /// Aborts a superstep once the evaluator has rejected `max` answers in
    /// it. Unlimited by default.
    #[inline]
    pub fn max_evaluations(mut self, max: usize) -> Self {
        self.max_evaluations = Some(max.max(1));
        self
    }

    /// Builds the sidekick.
    pub fn build(self) -> Sidekick {
        let evaluator = self
            .evaluator
            .unwrap_or_else(|| self.worker.with_role(ModelRole::Evaluator));
        let shared = Shared {
            worker: self.worker,
            evaluator,
            tools: self.tools.build(),
            max_evaluations: self.max_evaluations,
        };
        Sidekick {
            shared: Arc::new(shared),
        }
    }
}
