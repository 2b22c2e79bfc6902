use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio_stream::StreamExt;

use crate::tools::ToolDescriptor;

use super::message::{ContentBlock, Msg, Role, ToolCall};
use super::model::{ChatModel, DeltaSink, ModelError, ModelRequest, ModelResponse};

/// OpenAI-compatible chat-completions client. Covers OpenAI itself plus
/// the DeepSeek and DashScope compatibility endpoints.
pub struct OpenAiCompatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model_name: String,
    stream: bool,
}

impl OpenAiCompatModel {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        model_name: String,
        stream: bool,
    ) -> Self {
        OpenAiCompatModel { client, base_url, api_key, model_name, stream }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

// ── Wire formatting ──────────────────────────────────────────────────

/// Internal messages to the chat-completions wire shape. Tool results
/// become one `role: tool` message each, keyed by tool_call_id.
fn format_messages(messages: &[Msg]) -> Vec<Value> {
    let mut wire = Vec::with_capacity(messages.len());
    for msg in messages {
        match msg.role {
            Role::System | Role::User => {
                wire.push(json!({"role": msg.role.as_str(), "content": msg.joined_text()}));
            }
            Role::Assistant => {
                let tool_calls: Vec<Value> = msg
                    .content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolUse(call) => Some(json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": Value::Object(call.input.clone()).to_string(),
                            },
                        })),
                        _ => None,
                    })
                    .collect();

                let text = msg.joined_text();
                let mut entry = Map::new();
                entry.insert("role".into(), json!("assistant"));
                entry.insert(
                    "content".into(),
                    if text.is_empty() { Value::Null } else { Value::String(text) },
                );
                if !tool_calls.is_empty() {
                    entry.insert("tool_calls".into(), Value::Array(tool_calls));
                }
                wire.push(Value::Object(entry));
            }
            Role::Tool => {
                for block in &msg.content {
                    if let ContentBlock::ToolResult { id, output, .. } = block {
                        wire.push(json!({
                            "role": "tool",
                            "tool_call_id": id,
                            "content": output,
                        }));
                    }
                }
            }
        }
    }
    wire
}

fn format_tools(tools: &[ToolDescriptor]) -> Vec<Value> {
    tools
        .iter()
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
        .collect()
}

fn parse_arguments(raw: &str) -> Map<String, Value> {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}

/// A non-streaming `choices[0].message` into content blocks.
fn parse_message(message: &Value) -> Vec<ContentBlock> {
    let mut content = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            content.push(ContentBlock::Text { text: text.to_string() });
        }
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
            let func = call.get("function").cloned().unwrap_or(Value::Null);
            let name = func.get("name").and_then(Value::as_str).unwrap_or_default();
            let args = func.get("arguments").and_then(Value::as_str).unwrap_or("{}");
            if !name.is_empty() {
                content.push(ContentBlock::ToolUse(ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    input: parse_arguments(args),
                }));
            }
        }
    }
    content
}

// ── Streaming accumulation ───────────────────────────────────────────

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds `choices[0].delta` chunks into a final response, pushing text
/// deltas into the sink as they arrive.
#[derive(Default)]
struct StreamAccumulator {
    text: String,
    tool_calls: BTreeMap<u64, PartialToolCall>,
}

impl StreamAccumulator {
    async fn apply(&mut self, chunk: &Value, on_delta: Option<&DeltaSink>) {
        let Some(delta) = chunk
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("delta"))
        else {
            return;
        };

        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                self.text.push_str(text);
                if let Some(sink) = on_delta {
                    let _ = sink.send(text.to_string()).await;
                }
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0);
                let slot = self.tool_calls.entry(index).or_default();
                if let Some(id) = call.get("id").and_then(Value::as_str) {
                    slot.id.push_str(id);
                }
                if let Some(func) = call.get("function") {
                    if let Some(name) = func.get("name").and_then(Value::as_str) {
                        slot.name.push_str(name);
                    }
                    if let Some(args) = func.get("arguments").and_then(Value::as_str) {
                        slot.arguments.push_str(args);
                    }
                }
            }
        }
    }

    fn finish(self) -> ModelResponse {
        let mut content = Vec::new();
        if !self.text.is_empty() {
            content.push(ContentBlock::Text { text: self.text });
        }
        for (_, call) in self.tool_calls {
            if !call.name.is_empty() {
                content.push(ContentBlock::ToolUse(ToolCall {
                    id: call.id,
                    name: call.name,
                    input: parse_arguments(&call.arguments),
                }));
            }
        }
        ModelResponse { content }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::UpstreamTimeout(e.to_string())
    } else {
        ModelError::Network(e.to_string())
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    async fn chat(&self, req: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let mut body = json!({
            "model": self.model_name,
            "messages": format_messages(req.messages),
            "stream": self.stream,
        });
        if let Some(tools) = req.tools {
            if !tools.is_empty() {
                body["tools"] = Value::Array(format_tools(tools));
                if let Some(choice) = req.tool_choice {
                    body["tool_choice"] = json!(choice);
                }
            }
        }

        let resp = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::Protocol(format!("upstream returned {status}: {text}")));
        }

        if self.stream {
            self.consume_stream(resp, req.on_delta).await
        } else {
            let payload: Value = resp.json().await.map_err(map_reqwest_error)?;
            let message = payload
                .get("choices")
                .and_then(Value::as_array)
                .and_then(|c| c.first())
                .and_then(|c| c.get("message"))
                .cloned()
                .ok_or_else(|| ModelError::Protocol("missing choices[0].message".into()))?;
            let response = ModelResponse { content: parse_message(&message) };

            // Non-streaming calls still honor the delta hook with one shot.
            if let Some(sink) = req.on_delta {
                let text = response.text();
                if !text.is_empty() {
                    let _ = sink.send(text).await;
                }
            }
            Ok(response)
        }
    }
}

impl OpenAiCompatModel {
    async fn consume_stream(
        &self,
        resp: reqwest::Response,
        on_delta: Option<DeltaSink>,
    ) -> Result<ModelResponse, ModelError> {
        let mut acc = StreamAccumulator::default();
        let mut line_buf = String::new();
        let mut chunk_count = 0usize;

        let mut stream = Box::pin(resp.bytes_stream());
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(map_reqwest_error)?;
            line_buf.push_str(&String::from_utf8_lossy(&bytes));

            // SSE data lines can split anywhere; only consume completed lines.
            while let Some(pos) = line_buf.find('\n') {
                let line: String = line_buf.drain(..=pos).collect();
                let line = line.trim();
                let Some(data) = line.strip_prefix("data:") else { continue };
                let data = data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }
                if let Ok(value) = serde_json::from_str::<Value>(data) {
                    chunk_count += 1;
                    acc.apply(&value, on_delta.as_ref()).await;
                }
            }
        }

        tracing::debug!(chunks = chunk_count, accumulated_len = acc.text.len(), "stream done");
        Ok(acc.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_for_tool_round_trip() {
        let mut input = Map::new();
        input.insert("symbol".into(), json!("BTC"));
        let messages = vec![
            Msg::text(Role::System, "sys"),
            Msg::text(Role::User, "hi"),
            Msg::tool_uses(vec![ToolCall {
                id: "call_1".into(),
                name: "get_cex_klines".into(),
                input,
            }]),
            Msg::tool_result("call_1".into(), "get_cex_klines".into(), "{\"ok\":true}".into()),
        ];

        let wire = format_messages(&messages);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["role"], "assistant");
        assert_eq!(wire[2]["content"], Value::Null);
        assert_eq!(wire[2]["tool_calls"][0]["function"]["name"], "get_cex_klines");
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn parse_message_with_tool_calls() {
        let message = json!({
            "content": "thinking",
            "tool_calls": [{
                "id": "c1",
                "function": {"name": "t", "arguments": "{\"a\": 1}"},
            }],
        });
        let blocks = parse_message(&message);
        assert_eq!(blocks.len(), 2);
        let resp = ModelResponse { content: blocks };
        assert_eq!(resp.text(), "thinking");
        let calls = resp.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].input["a"], 1);
    }

    #[tokio::test]
    async fn accumulator_folds_deltas() {
        let mut acc = StreamAccumulator::default();
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);

        acc.apply(&json!({"choices": [{"delta": {"content": "he"}}]}), Some(&tx)).await;
        acc.apply(&json!({"choices": [{"delta": {"content": "llo"}}]}), Some(&tx)).await;
        acc.apply(
            &json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "c1", "function": {"name": "t", "arguments": "{\"a\""}}
            ]}}]}),
            Some(&tx),
        )
        .await;
        acc.apply(
            &json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": ": 2}"}}
            ]}}]}),
            Some(&tx),
        )
        .await;

        let resp = acc.finish();
        assert_eq!(resp.text(), "hello");
        let calls = resp.tool_calls();
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].input["a"], 2);

        assert_eq!(rx.recv().await.unwrap(), "he");
        assert_eq!(rx.recv().await.unwrap(), "llo");
    }
}
