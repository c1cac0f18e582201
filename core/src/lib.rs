pub mod agent;
pub mod config;
pub mod error;
pub mod providers;
pub mod tools;
pub mod traits;

pub use agent::{
    AgentDecision, AgentEvent, AgentLoop, ModelAdapter, PromptTemplate, RetryPolicy,
    ToolDescriptor, ToolRegistry,
};
pub use config::*;
pub use error::{AgentError, Result};
pub use providers::*;
pub use tools::*;
pub use traits::*;
