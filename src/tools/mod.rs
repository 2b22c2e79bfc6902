pub mod amm;
pub mod cex;
pub mod features;
pub mod preview;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::AppConfig;
use crate::llm::message::ToolCall;
use crate::market::MarketData;

/// What the model sees: name, description and an argument JSON schema.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A callable tool. Invocation never fails at the type level; errors are
/// serialized as `{ok: false, error: {...}}` payloads so the model can react.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// Infrastructure-bound arguments merged over the model's input before
    /// invocation. The model never sees these in the schema.
    fn presets(&self) -> Map<String, Value> {
        Map::new()
    }

    async fn invoke(&self, args: Map<String, Value>) -> String;
}

pub fn error_output(kind: &str, message: &str) -> String {
    json!({"ok": false, "error": {"type": kind, "message": message}}).to_string()
}

/// Ordered catalog of tools, looked up by name at dispatch time.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in set wired against the process configuration.
    pub fn builtin(config: &AppConfig, market: Arc<dyn MarketData>) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(amm::AmmSnapshotTool::new(config.evm.clone())));
        registry.register(Arc::new(preview::PreviewExecutionTool));
        registry.register(Arc::new(cex::CexKlinesTool::new(config.cex.clone(), market)));
        registry.register(Arc::new(features::KlineFeaturesTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.descriptor().name == name)
    }

    /// Dispatch one tool_use block: merge presets over the model's input and
    /// run under the per-tool budget. Timeouts and unknown tools come back as
    /// error JSON rather than failures.
    pub async fn call(&self, call: &ToolCall, timeout_s: f64) -> String {
        let Some(tool) = self.find(&call.name) else {
            return error_output("UnknownTool", &format!("no tool named {}", call.name));
        };

        let mut args = call.input.clone();
        for (k, v) in tool.presets() {
            args.insert(k, v);
        }

        if timeout_s > 0.0 {
            match tokio::time::timeout(Duration::from_secs_f64(timeout_s), tool.invoke(args)).await
            {
                Ok(output) => output,
                Err(_) => json!({
                    "ok": false,
                    "error": {"type": "TimeoutError", "message": "tool_timeout"},
                    "tool": call.name,
                })
                .to_string(),
            }
        } else {
            tool.invoke(args).await
        }
    }
}

pub(crate) fn arg_str(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "slow".into(),
                description: "sleeps".into(),
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        async fn invoke(&self, _args: Map<String, Value>) -> String {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "done".into()
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "echo".into(),
                description: "echoes args".into(),
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        fn presets(&self) -> Map<String, Value> {
            let mut m = Map::new();
            m.insert("base_url".into(), json!("https://preset.example"));
            m
        }

        async fn invoke(&self, args: Map<String, Value>) -> String {
            Value::Object(args).to_string()
        }
    }

    fn call(name: &str, input: Value) -> ToolCall {
        ToolCall {
            id: "c1".into(),
            name: name.into(),
            input: input.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn timeout_substitutes_error_json() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(SlowTool));
        let out = reg.call(&call("slow", json!({})), 0.01).await;
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["type"], "TimeoutError");
        assert_eq!(v["tool"], "slow");
    }

    #[tokio::test]
    async fn presets_overwrite_model_input() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let out = reg
            .call(&call("echo", json!({"base_url": "https://model.example", "x": 1})), 5.0)
            .await;
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["base_url"], "https://preset.example");
        assert_eq!(v["x"], 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_error_json() {
        let reg = ToolRegistry::new();
        let out = reg.call(&call("nope", json!({})), 1.0).await;
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["error"]["type"], "UnknownTool");
    }
}
