use crate::agent::ToolInvocation;
use crate::traits::ChatMessage;

#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateStep {
    pub invocation: ToolInvocation,
    pub observation: String,
}

/// Everything one run knows. Owned by that run and only ever appended to.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub input: String,
    /// Turns from before this run, placed ahead of `input` in the prompt.
    pub chat_history: Vec<ChatMessage>,
    /// Tool call and observation messages produced during this run.
    pub history: Vec<ChatMessage>,
    pub intermediate_steps: Vec<IntermediateStep>,
}

impl ConversationState {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    pub fn with_chat_history(mut self, chat_history: Vec<ChatMessage>) -> Self {
        self.chat_history = chat_history;
        self
    }

    pub fn record_step(&mut self, invocation: ToolInvocation, observation: String) {
        self.history.push(ChatMessage::assistant_with_tool_calls(
            invocation.log.clone(),
            vec![invocation.to_tool_call()],
        ));
        self.history.push(ChatMessage::tool_result(
            invocation.id.clone(),
            observation.clone(),
        ));
        self.intermediate_steps.push(IntermediateStep {
            invocation,
            observation,
        });
    }
}
