use crate::agent::{ConversationState, ToolDescriptor};
use crate::traits::ChatMessage;
use std::fmt::Write;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant";

/// Turns a conversation into the message list sent to the backend:
/// system prompt, prior turns, the user input, then this run's tool exchanges.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system_prompt: String,
    text_tool_protocol: bool,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl PromptTemplate {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            text_tool_protocol: false,
        }
    }

    /// Also describe the `<tool_call>` text protocol in the system prompt, for
    /// backends without native function calling.
    pub fn with_text_tool_protocol(mut self, enabled: bool) -> Self {
        self.text_tool_protocol = enabled;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn build_system_prompt(&self, tools: &[ToolDescriptor]) -> String {
        if !self.text_tool_protocol || tools.is_empty() {
            return self.system_prompt.clone();
        }

        format!(
            "{}\n\n---\n\n{}",
            self.system_prompt,
            tool_instructions(tools)
        )
    }

    pub fn build_messages(
        &self,
        state: &ConversationState,
        tools: &[ToolDescriptor],
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(state.chat_history.len() + state.history.len() + 2);
        messages.push(ChatMessage::system(self.build_system_prompt(tools)));
        messages.extend(state.chat_history.iter().cloned());
        messages.push(ChatMessage::user(state.input.clone()));
        messages.extend(state.history.iter().cloned());
        messages
    }
}

fn tool_instructions(tools: &[ToolDescriptor]) -> String {
    let mut instructions = String::new();
    instructions.push_str("## Tool Use Protocol\n\n");
    instructions.push_str("To use a tool, wrap a JSON object in <tool_call> tags:\n\n");
    instructions.push_str(
        "```\n<tool_call>\n{\"name\": \"tool_name\", \"arguments\": {\"param\": \"value\"}}\n</tool_call>\n```\n\n",
    );
    instructions.push_str("Request one tool per response. ");
    instructions.push_str("Tool results come back as tool messages. ");
    instructions.push_str("When you have the final answer, reply with plain text only.\n\n");
    instructions.push_str("### Available Tools\n\n");

    for tool in tools {
        let _ = writeln!(
            instructions,
            "**{}**: {}\nParameters: `{}`\n",
            tool.name,
            tool.description,
            tool.json_schema()
        );
    }

    instructions
}
