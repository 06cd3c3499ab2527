//! Language-model gateway
//!
//! Sends the conversation history plus the tool definitions to a hosted
//! model and reads back either a final text reply or a batch of structured
//! tool calls. Two wire dialects are supported: the Anthropic Messages API
//! and OpenAI-compatible chat completions (which also covers local servers).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};

use super::message::{Message, Role, ToolCallRequest};
use crate::config::{LlmConfig, LlmProvider};
use crate::tools::ToolRegistry;
use crate::{Error, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// What the model produced for one call
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// Final reply, no tools requested
    Text(String),
    /// One or more tool calls, with any text the model emitted alongside
    ToolCalls {
        preamble: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
}

/// A chat model that can request tool calls
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate the next assistant step for `history`
    ///
    /// # Errors
    ///
    /// - `ModelUnavailable` on network failure, 5xx, or an unreadable body
    /// - `Auth` when the credentials are rejected
    /// - `MalformedToolCall` when a tool call cannot be parsed
    async fn generate(&self, history: &[Message]) -> Result<ModelOutput>;
}

/// Build the gateway for the configured provider
///
/// The registry's tool definitions are bound into every request.
///
/// # Errors
///
/// Returns error if the HTTP client cannot be built
pub fn from_config(config: &LlmConfig, tools: &ToolRegistry) -> Result<Arc<dyn ChatModel>> {
    tracing::info!(
        provider = %config.provider,
        model = %config.model,
        base_url = %config.base_url,
        tools = tools.len(),
        keyless = config.is_keyless(),
        "language model configured"
    );

    Ok(match config.provider {
        LlmProvider::Anthropic => Arc::new(AnthropicGateway::new(config, tools)?),
        LlmProvider::OpenAi => Arc::new(OpenAiGateway::new(config, tools)?),
    })
}

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Send a request and classify transport and status failures
async fn send(request: reqwest::RequestBuilder) -> Result<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::ModelUnavailable(format!("request failed: {e}")))?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Auth(format!("language model {status}: {body}")));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%status, "model request rejected");
        return Err(Error::ModelUnavailable(format!("{status}: {body}")));
    }

    response
        .json()
        .await
        .map_err(|e| Error::ModelUnavailable(format!("unreadable response: {e}")))
}

fn malformed(reason: String, text: &str) -> Error {
    Error::MalformedToolCall {
        reason,
        text: Some(text.trim().to_string()).filter(|t| !t.is_empty()),
    }
}

fn finish(text: String, calls: Vec<ToolCallRequest>) -> ModelOutput {
    if calls.is_empty() {
        return ModelOutput::Text(text);
    }
    let preamble = Some(text).filter(|t| !t.trim().is_empty());
    ModelOutput::ToolCalls { preamble, calls }
}

/// Anthropic Messages API
pub struct AnthropicGateway {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
    tools: Vec<Value>,
}

impl AnthropicGateway {
    /// Create a gateway
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &LlmConfig, tools: &ToolRegistry) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
            tools: tools
                .definitions()
                .into_iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect(),
        })
    }

    fn body(&self, history: &[Message]) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": anthropic_messages(history),
        });
        if !self.system_prompt.is_empty() {
            body["system"] = json!(self.system_prompt);
        }
        if !self.tools.is_empty() {
            body["tools"] = json!(self.tools);
        }
        body
    }
}

/// Convert history to Anthropic content blocks
///
/// Tool results travel as `user` messages, and consecutive messages with the
/// same wire role are merged since the API requires alternation.
fn anthropic_messages(history: &[Message]) -> Vec<Value> {
    let mut out: Vec<(&'static str, Vec<Value>)> = Vec::new();

    for message in history {
        let (role, blocks) = match message.role {
            Role::User => ("user", vec![json!({"type": "text", "text": message.content})]),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(json!({"type": "text", "text": message.content}));
                }
                for call in &message.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                ("assistant", blocks)
            }
            Role::Tool => (
                "user",
                vec![json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.content,
                    "is_error": message.is_error,
                })],
            ),
        };

        if blocks.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some((last, existing)) if *last == role => existing.extend(blocks),
            _ => out.push((role, blocks)),
        }
    }

    out.into_iter()
        .map(|(role, content)| json!({"role": role, "content": content}))
        .collect()
}

fn parse_anthropic(body: &Value) -> Result<ModelOutput> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::ModelUnavailable("response has no content".to_string()))?;

    let mut text = String::new();
    let mut calls = Vec::new();
    let mut broken = None;

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(Value::as_str);
                let name = block.get("name").and_then(Value::as_str);
                let input = block.get("input").filter(|v| v.is_object());
                let (Some(id), Some(name), Some(input)) = (id, name, input) else {
                    broken.get_or_insert_with(|| format!("incomplete tool_use block: {block}"));
                    continue;
                };
                calls.push(ToolCallRequest {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: input.clone(),
                });
            }
            other => tracing::debug!(block_type = ?other, "ignoring content block"),
        }
    }

    if let Some(reason) = broken {
        return Err(malformed(reason, &text));
    }
    Ok(finish(text, calls))
}

#[async_trait]
impl ChatModel for AnthropicGateway {
    async fn generate(&self, history: &[Message]) -> Result<ModelOutput> {
        tracing::debug!(messages = history.len(), model = %self.model, "calling Anthropic");

        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.body(history));

        let body = send(request).await?;
        parse_anthropic(&body)
    }
}

/// OpenAI-compatible chat completions
pub struct OpenAiGateway {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
    tools: Vec<Value>,
}

impl OpenAiGateway {
    /// Create a gateway
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &LlmConfig, tools: &ToolRegistry) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
            tools: tools
                .definitions()
                .into_iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect(),
        })
    }

    fn body(&self, history: &[Message]) -> Value {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !self.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": self.system_prompt}));
        }
        messages.extend(history.iter().map(openai_message));

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": messages,
        });
        if !self.tools.is_empty() {
            body["tools"] = json!(self.tools);
        }
        body
    }
}

fn openai_message(message: &Message) -> Value {
    match message.role {
        Role::User => json!({"role": "user", "content": message.content}),
        Role::Assistant if message.has_tool_calls() => {
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": c.arguments.to_string(),
                        },
                    })
                })
                .collect();
            let content = if message.content.is_empty() {
                Value::Null
            } else {
                json!(message.content)
            };
            json!({"role": "assistant", "content": content, "tool_calls": calls})
        }
        Role::Assistant => json!({"role": "assistant", "content": message.content}),
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
            "content": message.content,
        }),
    }
}

/// One `tool_calls` entry; `Err` carries the reason it is unusable
fn parse_openai_call(raw: &Value) -> std::result::Result<ToolCallRequest, String> {
    let id = raw.get("id").and_then(Value::as_str);
    let function = raw.get("function");
    let name = function.and_then(|f| f.get("name")).and_then(Value::as_str);
    let (Some(id), Some(name)) = (id, name) else {
        return Err(format!("incomplete tool call: {raw}"));
    };

    let arguments = match function.and_then(|f| f.get("arguments")) {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::String(s)) if s.trim().is_empty() => Value::Object(Map::new()),
        Some(Value::String(s)) => serde_json::from_str(s)
            .map_err(|e| format!("arguments for {name} are not JSON: {e}"))?,
        Some(other) => other.clone(),
    };

    Ok(ToolCallRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    })
}

fn parse_openai(body: &Value) -> Result<ModelOutput> {
    let message = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| Error::ModelUnavailable("response has no choices".to_string()))?;

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|raw| {
            raw.iter()
                .map(parse_openai_call)
                .collect::<std::result::Result<Vec<_>, _>>()
        })
        .transpose()
        .map_err(|reason| malformed(reason, &text))?
        .unwrap_or_default();

    Ok(finish(text, calls))
}

#[async_trait]
impl ChatModel for OpenAiGateway {
    async fn generate(&self, history: &[Message]) -> Result<ModelOutput> {
        tracing::debug!(messages = history.len(), model = %self.model, "calling chat completions");

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.body(history));

        let body = send(request).await?;
        parse_openai(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ToolResult;

    fn history() -> Vec<Message> {
        vec![
            Message::user("siéntate"),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCallRequest {
                    id: "call_1".to_string(),
                    name: "set_posture_to".to_string(),
                    arguments: json!({"posture": "Sit"}),
                }],
            ),
            Message::tool_result(ToolResult {
                call_id: "call_1".to_string(),
                name: "set_posture_to".to_string(),
                content: "posture done".to_string(),
                is_error: false,
            }),
        ]
    }

    #[test]
    fn anthropic_tool_results_ride_in_user_turns() {
        let mut h = history();
        h.push(Message::user("gracias"));
        let msgs = anthropic_messages(&h);

        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1]["content"][0]["type"], "tool_use");
        assert_eq!(msgs[1]["content"][0]["input"]["posture"], "Sit");
        // Tool result and the next user line are merged into one user turn
        assert_eq!(msgs[2]["role"], "user");
        assert_eq!(msgs[2]["content"][0]["type"], "tool_result");
        assert_eq!(msgs[2]["content"][0]["tool_use_id"], "call_1");
        assert_eq!(msgs[2]["content"][1]["text"], "gracias");
    }

    #[test]
    fn anthropic_parse_text_and_calls() {
        let text = parse_anthropic(&json!({
            "content": [{"type": "text", "text": "Hola"}],
            "stop_reason": "end_turn",
        }))
        .unwrap();
        assert_eq!(text, ModelOutput::Text("Hola".to_string()));

        let calls = parse_anthropic(&json!({
            "content": [
                {"type": "text", "text": "Let me sit."},
                {"type": "tool_use", "id": "tu_1", "name": "set_posture_to", "input": {"posture": "Sit"}},
            ],
            "stop_reason": "tool_use",
        }))
        .unwrap();
        let ModelOutput::ToolCalls { preamble, calls } = calls else {
            panic!("expected tool calls");
        };
        assert_eq!(preamble.as_deref(), Some("Let me sit."));
        assert_eq!(calls[0].id, "tu_1");
    }

    #[test]
    fn anthropic_tool_use_without_input_is_malformed() {
        let result = parse_anthropic(&json!({
            "content": [{"type": "tool_use", "id": "tu_1", "name": "say_joke"}],
        }));
        assert!(matches!(result, Err(Error::MalformedToolCall { text: None, .. })));
    }

    #[test]
    fn malformed_tool_use_keeps_surrounding_text() {
        let result = parse_anthropic(&json!({
            "content": [
                {"type": "tool_use", "id": "tu_1", "name": "say_joke"},
                {"type": "text", "text": "Here is one anyway."},
            ],
        }));
        let Err(Error::MalformedToolCall { text, .. }) = result else {
            panic!("expected malformed tool call, got {result:?}");
        };
        assert_eq!(text.as_deref(), Some("Here is one anyway."));
    }

    #[test]
    fn openai_assistant_calls_serialize_arguments_as_string() {
        let msg = openai_message(&history()[1]);
        assert_eq!(msg["content"], Value::Null);
        assert_eq!(msg["tool_calls"][0]["function"]["arguments"], r#"{"posture":"Sit"}"#);

        let tool = openai_message(&history()[2]);
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_1");
    }

    #[test]
    fn openai_parse_arguments() {
        let out = parse_openai(&json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [
                    {"id": "c1", "type": "function", "function": {"name": "get_temperature", "arguments": "{\"latitude\": 40.4, \"longitude\": -3.7}"}},
                    {"id": "c2", "type": "function", "function": {"name": "get_is_day", "arguments": ""}},
                ],
            }}],
        }))
        .unwrap();

        let ModelOutput::ToolCalls { preamble, calls } = out else {
            panic!("expected tool calls");
        };
        assert!(preamble.is_none());
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments["latitude"], 40.4);
        assert_eq!(calls[1].arguments, json!({}));
    }

    #[test]
    fn openai_bad_argument_json_is_malformed() {
        let result = parse_openai(&json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "c1", "function": {"name": "say_joke", "arguments": "{joke: "}},
            ]}}],
        }));
        assert!(matches!(result, Err(Error::MalformedToolCall { .. })));
    }

    #[test]
    fn missing_choices_is_unavailable() {
        assert!(matches!(
            parse_openai(&json!({"error": "overloaded"})),
            Err(Error::ModelUnavailable(_))
        ));
    }
}
