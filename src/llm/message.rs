use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse(ToolCall),
    ToolResult { id: String, name: String, output: String },
}

/// One conversational turn. Block order within a message is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Msg {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Msg {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Msg { role, content: vec![ContentBlock::Text { text: text.into() }] }
    }

    pub fn tool_uses(calls: Vec<ToolCall>) -> Self {
        Msg {
            role: Role::Assistant,
            content: calls.into_iter().map(ContentBlock::ToolUse).collect(),
        }
    }

    pub fn tool_result(id: String, name: String, output: String) -> Self {
        Msg { role: Role::Tool, content: vec![ContentBlock::ToolResult { id, name, output }] }
    }

    /// All text blocks joined with newlines, skipping empties.
    pub fn joined_text(&self) -> String {
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
}
