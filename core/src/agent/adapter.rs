use crate::agent::{AgentDecision, ConversationState, PromptTemplate, ToolDescriptor, ToolInvocation};
use crate::error::{AgentError, Result};
use crate::traits::{ChatRequest, ChatResponse, Provider, ToolArguments, ToolCall, ToolSpec};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const TOOL_CALL_OPEN_TAG: &str = "<tool_call>";
const TOOL_CALL_CLOSE_TAG: &str = "</tool_call>";

/// Wraps a chat backend and turns each of its replies into exactly one
/// [`AgentDecision`].
pub struct ModelAdapter {
    provider: Arc<dyn Provider>,
    prompt: PromptTemplate,
    model: String,
    temperature: f64,
}

impl ModelAdapter {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            provider,
            prompt: PromptTemplate::default(),
            model: model.into(),
            temperature,
        }
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub async fn propose(
        &self,
        state: &ConversationState,
        tools: &[ToolDescriptor],
    ) -> Result<AgentDecision> {
        let messages = self.prompt.build_messages(state, tools);
        let specs: Vec<ToolSpec> = tools.iter().map(ToolDescriptor::to_spec).collect();
        let request = ChatRequest {
            messages: &messages,
            tools: if specs.is_empty() { None } else { Some(&specs) },
        };

        let response = self
            .provider
            .chat(request, &self.model, self.temperature)
            .await?;

        let decision = decide(response, tools)?;
        debug!(?decision, "Model proposed");
        Ok(decision)
    }
}

/// Maps a backend reply onto `Finish` or `Invoke`.
///
/// Native tool calls win over text. Without them, `<tool_call>` blocks in the
/// text are honoured, and a closed block that holds no usable call is
/// `MalformedResponse`. Otherwise non-empty text is the final answer.
pub fn decide(response: ChatResponse, tools: &[ToolDescriptor]) -> Result<AgentDecision> {
    let text = response.text_or_empty().trim().to_string();

    let (log, mut calls) = if response.has_tool_calls() {
        (text, response.tool_calls)
    } else {
        parse_tool_calls_fallback(&text)?
    };

    if calls.is_empty() {
        if log.is_empty() {
            return Err(AgentError::MalformedResponse(
                "response carried neither text nor a tool call".to_string(),
            ));
        }
        return Ok(AgentDecision::Finish { output: log });
    }

    if calls.len() > 1 {
        warn!(
            dropped = calls.len() - 1,
            "Backend returned several tool calls; only the first is executed"
        );
    }
    let call = calls.swap_remove(0);
    invocation_from_call(call, log, tools).map(AgentDecision::Invoke)
}

fn invocation_from_call(
    call: ToolCall,
    log: String,
    tools: &[ToolDescriptor],
) -> Result<ToolInvocation> {
    let name = call.name.trim();
    if name.is_empty() {
        return Err(AgentError::MalformedResponse(
            "tool call without a function name".to_string(),
        ));
    }

    let arguments = parse_arguments(name, &call.arguments)?;

    // Unadvertised names pass through so the loop can report `UnknownTool`.
    if let Some(descriptor) = tools.iter().find(|d| d.name == name) {
        descriptor.validate(&arguments).map_err(|reason| {
            AgentError::MalformedResponse(format!("bad arguments for '{}': {}", name, reason))
        })?;
    }

    let id = if call.id.is_empty() {
        derived_call_id(&call.arguments)
    } else {
        call.id
    };

    Ok(ToolInvocation {
        id,
        tool: name.to_string(),
        arguments,
        log,
    })
}

fn parse_arguments(name: &str, raw: &str) -> Result<ToolArguments> {
    if raw.trim().is_empty() {
        return Ok(ToolArguments::new());
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AgentError::MalformedResponse(format!(
            "arguments for '{}' must be a JSON object, got {}",
            name, other
        ))),
        Err(e) => Err(AgentError::MalformedResponse(format!(
            "failed to parse arguments for '{}': {}",
            name, e
        ))),
    }
}

fn derived_call_id(arguments: &str) -> String {
    format!("call_{:x}", md5::compute(arguments.as_bytes()))
}

fn parse_tool_calls_fallback(response: &str) -> Result<(String, Vec<ToolCall>)> {
    let mut text_parts = Vec::new();
    let mut calls = Vec::new();
    let mut remaining = response;

    while let Some(start) = remaining.find(TOOL_CALL_OPEN_TAG) {
        let after_open = &remaining[start + TOOL_CALL_OPEN_TAG.len()..];
        let Some(close_idx) = after_open.find(TOOL_CALL_CLOSE_TAG) else {
            break;
        };

        let before = &remaining[..start];
        if !before.trim().is_empty() {
            text_parts.push(before.trim().to_string());
        }

        let inner = &after_open[..close_idx];
        let parsed: Vec<ToolCall> = extract_json_values(inner)
            .iter()
            .filter_map(parse_tool_call_value)
            .collect();
        if parsed.is_empty() {
            return Err(AgentError::MalformedResponse(format!(
                "unreadable tool call block: {}",
                inner.trim()
            )));
        }
        calls.extend(parsed);
        remaining = &after_open[close_idx + TOOL_CALL_CLOSE_TAG.len()..];
    }

    if !remaining.trim().is_empty() {
        text_parts.push(remaining.trim().to_string());
    }

    Ok((text_parts.join("\n"), calls))
}

fn extract_json_values(text: &str) -> Vec<Value> {
    let mut values = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0
                    && let Some(s) = start.take()
                    && let Ok(value) = serde_json::from_str::<Value>(&text[s..=i])
                {
                    values.push(value);
                }
            }
            _ => {}
        }
    }

    values
}

fn parse_tool_call_value(value: &Value) -> Option<ToolCall> {
    let name = value.get("name")?.as_str()?.to_string();
    let arguments = match value.get("arguments") {
        Some(args) => serde_json::to_string(args).ok()?,
        None => "{}".to_string(),
    };

    Some(ToolCall {
        id: derived_call_id(&arguments),
        name,
        arguments,
    })
}
