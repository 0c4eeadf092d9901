use std::collections::HashMap;
use std::sync::Arc;

use sidekick_model::ModelTool;

use super::{AnyTool, Tool, ToolObject};

/// [`ToolRegistry`] builder.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: HashMap<String, Arc<dyn ToolObject>>,
}

impl ToolRegistryBuilder {
    /// Registers a tool. A tool with the same name replaces the previous one.
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        let name = tool.name().to_owned();
        if self.tools.insert(name, Arc::new(AnyTool(tool))).is_some() {
            warn!("tool registered twice, keeping the last one");
        }
        self
    }

    /// Builds the registry.
    #[inline]
    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}

/// An immutable set of tools, looked up by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolObject>>,
}

impl ToolRegistry {
    /// Creates a builder.
    #[inline]
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Returns the number of tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if there is no tool.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns `true` if a tool with the name is registered.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    #[inline]
    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn ToolObject>> {
        self.tools.get(name).cloned()
    }

    /// Returns the tool descriptors sent to the model, sorted by name.
    pub fn definitions(&self) -> Vec<ModelTool> {
        let mut definitions: Vec<_> = self
            .tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }
}
