pub mod adapter;
pub mod context;
pub mod control;
pub mod decision;
pub mod descriptor;
pub mod loop_;
pub mod registry;
pub mod state;

pub use adapter::ModelAdapter;
pub use context::PromptTemplate;
pub use control::RetryPolicy;
pub use decision::{AgentDecision, ToolInvocation};
pub use descriptor::{ParamType, ToolDescriptor, ToolParameter};
pub use loop_::{AgentEvent, AgentLoop, DEFAULT_MAX_ITERATIONS};
pub use registry::ToolRegistry;
pub use state::{ConversationState, IntermediateStep};
