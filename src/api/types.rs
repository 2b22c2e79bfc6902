use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::Action;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub user_input: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Fields are always present on the wire; absent values serialize as null.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub assistant_text: String,
    pub actions: Vec<Action>,
    pub execution_preview: Option<Value>,
    pub execution_plan: Option<Value>,
    pub strategy_type: Option<String>,
    pub strategy_label: Option<String>,
}
