use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

/// Failures surfaced by a single agent run.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Backend unreachable, rate limited or answering with a non-success status.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("no final answer after {0} iterations")]
    MaxIterationsExceeded(usize),

    #[error("run cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
