use crate::agent::{ToolDescriptor, ToolInvocation};
use crate::error::{AgentError, Result};
use crate::traits::{Tool, ToolSpec};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

struct RegisteredTool {
    descriptor: ToolDescriptor,
    tool: Arc<dyn Tool>,
}

/// Name-keyed tool table. Built once before any run starts and shared
/// read-only behind an `Arc` afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let descriptor = tool.descriptor();
        if self.index.contains_key(&descriptor.name) {
            return Err(AgentError::DuplicateTool(descriptor.name));
        }

        tracing::debug!(tool = %descriptor.name, "Registered tool");
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool { descriptor, tool });
        Ok(())
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.entry(name).map(|entry| Arc::clone(&entry.tool))
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.entry(name).ok().map(|entry| &entry.descriptor)
    }

    /// Descriptors in registration order.
    pub fn list_descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }

    pub fn get_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.descriptor.to_spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolves, validates and runs the invocation, returning the observation
    /// text that is fed back to the model.
    pub async fn execute(&self, invocation: &ToolInvocation) -> Result<String> {
        let entry = self.entry(&invocation.tool)?;

        entry
            .descriptor
            .validate(&invocation.arguments)
            .map_err(|reason| AgentError::InvalidArguments {
                tool: invocation.tool.clone(),
                reason,
            })?;

        let value = entry
            .tool
            .execute(&invocation.arguments)
            .await
            .map_err(|e| AgentError::ToolExecution {
                tool: invocation.tool.clone(),
                message: format!("{e:#}"),
            })?;

        Ok(stringify_observation(value))
    }

    fn entry(&self, name: &str) -> Result<&RegisteredTool> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }
}

fn stringify_observation(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
