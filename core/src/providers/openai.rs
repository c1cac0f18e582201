use crate::error::{AgentError, Result};
use crate::traits::{ChatMessage, ChatRequest, ChatResponse, Provider, ToolCall, ToolSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest<'a> {
    id: &'a str,
    r#type: &'a str,
    function: OpenAIFunctionRequest<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionRequest<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAITool<'a> {
    r#type: &'a str,
    function: OpenAIToolFunction<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    #[serde(default)]
    id: String,
    function: OpenAIFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Client for any backend speaking the OpenAI chat-completions protocol
/// (OpenAI itself, Groq, OpenRouter).
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    headers: Vec<(String, String)>,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            headers: Vec::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let url = base_url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn convert_messages<'a>(&self, messages: &'a [ChatMessage]) -> Vec<OpenAIMessage<'a>> {
        messages
            .iter()
            .map(|m| {
                let tool_calls = m.tool_calls.as_ref().map(|tool_calls| {
                    tool_calls
                        .iter()
                        .map(|tc| OpenAIToolCallRequest {
                            id: &tc.id,
                            r#type: "function",
                            function: OpenAIFunctionRequest {
                                name: &tc.name,
                                arguments: &tc.arguments,
                            },
                        })
                        .collect()
                });

                let content = if m.content.is_empty() && tool_calls.is_some() {
                    None
                } else {
                    Some(m.content.as_str())
                };

                OpenAIMessage {
                    role: &m.role,
                    content,
                    tool_calls,
                    tool_call_id: m.tool_call_id.as_deref(),
                }
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolSpec]) -> Vec<OpenAITool<'_>> {
        tools
            .iter()
            .map(|t| OpenAITool {
                r#type: "function",
                function: OpenAIToolFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters_schema,
                },
            })
            .collect()
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_default()
}

fn parse_response(body: &str) -> Result<ChatResponse> {
    let openai_response: OpenAIResponse = serde_json::from_str(body)
        .map_err(|e| AgentError::MalformedResponse(format!("undecodable response body: {}", e)))?;

    let message = openai_response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| AgentError::MalformedResponse("no choices in response".to_string()))?;

    let tool_calls: Vec<ToolCall> = message
        .tool_calls
        .map(|calls| {
            calls
                .into_iter()
                .map(|c| ToolCall {
                    id: c.id,
                    name: c.function.name,
                    arguments: c.function.arguments,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        text: message.content,
        tool_calls,
    })
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(
        &self,
        request: ChatRequest<'_>,
        model: &str,
        temperature: f64,
    ) -> Result<ChatResponse> {
        let tools = request.tools.map(Self::convert_tools);
        let openai_request = OpenAIRequest {
            model,
            messages: self.convert_messages(request.messages),
            parallel_tool_calls: tools.as_ref().map(|_| false),
            tools,
            temperature,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&openai_request);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AgentError::Transport(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::Transport(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(AgentError::Transport(format!(
                "API error {}: {}",
                status, body
            )));
        }

        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spec() -> ToolSpec {
        ToolSpec {
            name: "add".into(),
            description: "Add two integers.".into(),
            parameters_schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn parses_text_reply() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "8"}}]});
        let response = parse_response(&body.to_string()).unwrap();
        assert_eq!(response.text.as_deref(), Some("8"));
        assert!(response.tool_calls.is_empty());
    }

    #[test]
    fn parses_tool_call_reply() {
        let body = json!({"choices": [{"message": {
            "role": "assistant",
            "content": null,
            "tool_calls": [{"id": "call_9", "type": "function",
                "function": {"name": "add", "arguments": "{\"first_int\":1,\"second_int\":2}"}}]
        }}]});
        let response = parse_response(&body.to_string()).unwrap();
        assert_eq!(response.text, None);
        assert_eq!(response.tool_calls[0].id, "call_9");
        assert_eq!(response.tool_calls[0].name, "add");
    }

    #[test]
    fn empty_choices_is_malformed() {
        let err = parse_response(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse(_)));
    }

    #[test]
    fn omits_empty_content_next_to_tool_calls() {
        let provider = OpenAIProvider::new("k");
        let messages = vec![ChatMessage::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c".into(),
                name: "add".into(),
                arguments: "{}".into(),
            }],
        )];
        let converted = serde_json::to_value(provider.convert_messages(&messages)).unwrap();
        assert!(converted[0].get("content").is_none());
        assert_eq!(converted[0]["tool_calls"][0]["type"], "function");
    }

    #[tokio::test]
    async fn posts_chat_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .and(header("x-title", "agentry"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "temperature": 0.0,
                "parallel_tool_calls": false,
                "tools": [{"type": "function", "function": {"name": "add"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("secret")
            .with_base_url(format!("{}/", server.uri()))
            .with_header("X-Title", "agentry");
        let messages = [ChatMessage::user("hi")];
        let tools = [spec()];
        let response = provider
            .chat(
                ChatRequest {
                    messages: &messages,
                    tools: Some(&tools),
                },
                "gpt-3.5-turbo",
                0.0,
            )
            .await
            .unwrap();

        assert_eq!(response.text.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn rate_limit_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("k").with_base_url(server.uri());
        let messages = [ChatMessage::user("hi")];
        let err = provider
            .chat(
                ChatRequest {
                    messages: &messages,
                    tools: None,
                },
                "m",
                0.0,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Transport(msg) if msg.contains("429") && msg.contains("slow down")));
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("k").with_base_url(server.uri());
        let messages = [ChatMessage::user("hi")];
        let err = provider
            .chat(
                ChatRequest {
                    messages: &messages,
                    tools: None,
                },
                "m",
                0.0,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::MalformedResponse(_)));
    }
}
