use crate::agent::ToolRegistry;
use crate::error::Result;
use crate::traits::ToolArguments;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub mod math;
pub mod score;

pub use math::{AddTool, ExponentiateTool, MultiplyTool};
pub use score::GameScoreTool;

/// Deserializes validated arguments into a tool's typed parameter struct.
pub fn typed_args<T: DeserializeOwned>(args: &ToolArguments) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::Object(args.clone()))
        .map_err(|e| anyhow::anyhow!("Invalid arguments: {}", e))
}

/// `add`, `multiply` and `exponentiate`.
pub fn math_registry() -> Result<ToolRegistry> {
    ToolRegistry::new()
        .with_tool(Arc::new(MultiplyTool))?
        .with_tool(Arc::new(AddTool))?
        .with_tool(Arc::new(ExponentiateTool))
}

pub fn score_registry() -> Result<ToolRegistry> {
    ToolRegistry::new().with_tool(Arc::new(GameScoreTool))
}
