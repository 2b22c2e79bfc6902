use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{Tool, ToolDescriptor, arg_str};

/// Produce a preview-only execution payload. Nothing is signed or sent.
pub struct PreviewExecutionTool;

#[async_trait]
impl Tool for PreviewExecutionTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "preview_execution".into(),
            description: "Create a preview-only execution payload that the user must \
                          confirm before anything is signed."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action_type": {
                        "type": "string",
                        "description": "Action type (e.g. \"swap\")."
                    },
                    "amount_in": {
                        "type": "string",
                        "description": "Amount in human-readable units."
                    },
                    "token_in": {"type": "string", "description": "Optional ERC20 address."},
                    "token_out": {"type": "string", "description": "Optional ERC20 address."}
                },
                "required": ["action_type", "amount_in"]
            }),
        }
    }

    async fn invoke(&self, args: Map<String, Value>) -> String {
        json!({
            "mode": "preview",
            "action_type": arg_str(&args, "action_type"),
            "token_in": args.get("token_in").cloned().unwrap_or(Value::Null),
            "token_out": args.get("token_out").cloned().unwrap_or(Value::Null),
            "amount_in": arg_str(&args, "amount_in"),
            "requires_confirmation": true,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preview_requires_confirmation() {
        let args = json!({"action_type": "swap", "amount_in": "1.5"});
        let out = PreviewExecutionTool.invoke(args.as_object().cloned().unwrap()).await;
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["mode"], "preview");
        assert_eq!(v["requires_confirmation"], true);
        assert_eq!(v["action_type"], "swap");
        assert_eq!(v["token_in"], Value::Null);
    }
}
