use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::tools::ToolDescriptor;

use super::message::{ContentBlock, Msg, ToolCall};

/// Incremental text fragments observed while a response streams in.
pub type DeltaSink = mpsc::Sender<String>;

pub struct ModelRequest<'a> {
    pub messages: &'a [Msg],
    pub tools: Option<&'a [ToolDescriptor]>,
    pub tool_choice: Option<&'a str>,
    /// When set, providers push text deltas here as they arrive; providers
    /// that do not stream push the full text once.
    pub on_delta: Option<DeltaSink>,
}

/// What came back from one model call: text and/or tool invocations.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
}

impl ModelResponse {
    pub fn text(&self) -> String {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect();
        parts.join("\n")
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The configured per-call budget elapsed.
    #[error("llm_timeout")]
    Timeout,
    /// The transport-level request timed out upstream.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),
    #[error("upstream network error: {0}")]
    Network(String),
    #[error("upstream protocol error: {0}")]
    Protocol(String),
    #[error("model_empty_response")]
    EmptyResponse,
}

/// Chat-completion provider with optional function calling and streaming.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, req: ModelRequest<'_>) -> Result<ModelResponse, ModelError>;
}
