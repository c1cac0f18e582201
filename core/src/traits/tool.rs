use crate::agent::{ToolDescriptor, ToolParameter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type ToolArguments = serde_json::Map<String, serde_json::Value>;

/// The function schema advertised to a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ToolParameter>;

    async fn execute(&self, args: &ToolArguments) -> anyhow::Result<serde_json::Value>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}
