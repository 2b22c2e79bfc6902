use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::tools::ToolDescriptor;

use super::message::{ContentBlock, Msg, Role, ToolCall};
use super::model::{ChatModel, ModelError, ModelRequest, ModelResponse};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Anthropic messages-API client, non-streaming.
pub struct AnthropicModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model_name: String,
}

impl AnthropicModel {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        model_name: String,
    ) -> Self {
        AnthropicModel { client, base_url, api_key, model_name }
    }
}

/// System turns move to the top-level `system` string; tool results are
/// delivered as user-role tool_result blocks.
fn format_messages(messages: &[Msg]) -> (String, Vec<Value>) {
    let mut system = Vec::new();
    let mut wire = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system.push(msg.joined_text()),
            Role::User => {
                wire.push(json!({"role": "user", "content": msg.joined_text()}));
            }
            Role::Assistant => {
                let blocks: Vec<Value> = msg
                    .content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } if !text.is_empty() => {
                            Some(json!({"type": "text", "text": text}))
                        }
                        ContentBlock::ToolUse(call) => Some(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": Value::Object(call.input.clone()),
                        })),
                        _ => None,
                    })
                    .collect();
                wire.push(json!({"role": "assistant", "content": blocks}));
            }
            Role::Tool => {
                let blocks: Vec<Value> = msg
                    .content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolResult { id, output, .. } => Some(json!({
                            "type": "tool_result",
                            "tool_use_id": id,
                            "content": output,
                        })),
                        _ => None,
                    })
                    .collect();
                wire.push(json!({"role": "user", "content": blocks}));
            }
        }
    }
    (system.join("\n"), wire)
}

fn parse_content(payload: &Value) -> Vec<ContentBlock> {
    let mut content = Vec::new();
    let Some(blocks) = payload.get("content").and_then(Value::as_array) else {
        return content;
    };
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    content.push(ContentBlock::Text { text: text.to_string() });
                }
            }
            Some("tool_use") => {
                let input = block
                    .get("input")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_else(Map::new);
                content.push(ContentBlock::ToolUse(ToolCall {
                    id: block.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    name: block
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    input,
                }));
            }
            _ => {}
        }
    }
    content
}

#[async_trait]
impl ChatModel for AnthropicModel {
    async fn chat(&self, req: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let (system, messages) = format_messages(req.messages);
        let mut body = json!({
            "model": self.model_name,
            "max_tokens": MAX_TOKENS,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if let Some(tools) = req.tools {
            if !tools.is_empty() {
                let wire_tools: Vec<Value> = tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect();
                body["tools"] = Value::Array(wire_tools);
                if req.tool_choice == Some("auto") {
                    body["tool_choice"] = json!({"type": "auto"});
                }
            }
        }

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::UpstreamTimeout(e.to_string())
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::Protocol(format!("upstream returned {status}: {text}")));
        }

        let payload: Value =
            resp.json().await.map_err(|e| ModelError::Network(e.to_string()))?;
        let response = ModelResponse { content: parse_content(&payload) };

        if let Some(sink) = req.on_delta {
            let text = response.text();
            if !text.is_empty() {
                let _ = sink.send(text).await;
            }
        }
        Ok(response)
    }
}
