use crate::traits::{ToolArguments, ToolCall};
use serde::{Deserialize, Serialize};

/// A single request from the model to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub tool: String,
    pub arguments: ToolArguments,
    /// Assistant text that accompanied the call, if any.
    pub log: String,
}

impl ToolInvocation {
    pub fn to_tool_call(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            name: self.tool.clone(),
            arguments: serde_json::Value::Object(self.arguments.clone()).to_string(),
        }
    }
}

/// The model's output for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentDecision {
    Finish { output: String },
    Invoke(ToolInvocation),
}

impl AgentDecision {
    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }
}
