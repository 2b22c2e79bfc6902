use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{Tool, ToolDescriptor, error_output};

/// Minimal trend/volatility features over a kline list the model already
/// holds (typically the output of get_cex_klines).
pub struct KlineFeaturesTool;

#[async_trait]
impl Tool for KlineFeaturesTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "compute_kline_features".into(),
            description: "Compute minimal trend/volatility features (pct_change, \
                          log-return volatility) from a kline list produced by \
                          get_cex_klines."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "klines": {
                        "type": "array",
                        "description": "Kline objects with a close field.",
                        "items": {"type": "object"}
                    },
                    "lookback": {
                        "type": "integer",
                        "description": "Use the last N klines."
                    }
                },
                "required": ["klines"]
            }),
        }
    }

    async fn invoke(&self, args: Map<String, Value>) -> String {
        let Some(klines) = args.get("klines").and_then(Value::as_array) else {
            return error_output("InvalidInput", "klines is required");
        };
        if klines.is_empty() {
            return error_output("InvalidInput", "klines is required");
        }

        let lookback = args
            .get("lookback")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or_else(|| klines.len().min(200));
        if lookback <= 1 {
            return error_output("InvalidInput", "lookback too small");
        }

        let start = klines.len().saturating_sub(lookback);
        let closes: Vec<f64> = klines[start..]
            .iter()
            .filter_map(|k| k.as_object())
            .filter_map(|k| match k.get("close") {
                Some(Value::String(s)) => s.parse().ok(),
                Some(Value::Number(n)) => n.as_f64(),
                _ => None,
            })
            .collect();

        if closes.len() <= 1 {
            return error_output("InvalidInput", "not enough close values");
        }

        let first = closes[0];
        let last = *closes.last().expect("non-empty");
        let pct_change = if first != 0.0 { (last - first) / first } else { 0.0 };

        let log_returns: Vec<f64> = closes
            .windows(2)
            .filter(|w| w[0] > 0.0 && w[1] > 0.0)
            .map(|w| (w[1] / w[0]).ln())
            .collect();

        let volatility = if log_returns.len() >= 2 {
            let mean = log_returns.iter().sum::<f64>() / log_returns.len() as f64;
            let var = log_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
                / log_returns.len() as f64;
            var.sqrt()
        } else {
            0.0
        };

        json!({
            "ok": true,
            "lookback": lookback,
            "first_close": first,
            "last_close": last,
            "pct_change": pct_change,
            "volatility_logret": volatility,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn computes_pct_change() {
        let klines = json!([
            {"close": "100.0"},
            {"close": "110.0"},
            {"close": "121.0"}
        ]);
        let out = KlineFeaturesTool.invoke(args(json!({"klines": klines}))).await;
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["ok"], true);
        assert!((v["pct_change"].as_f64().unwrap() - 0.21).abs() < 1e-9);
        // 10% steps in log space have zero dispersion
        assert!(v["volatility_logret"].as_f64().unwrap() < 1e-9);
    }

    #[tokio::test]
    async fn lookback_trims_history() {
        let klines = json!([
            {"close": "1.0"},
            {"close": "2.0"},
            {"close": "4.0"}
        ]);
        let out = KlineFeaturesTool
            .invoke(args(json!({"klines": klines, "lookback": 2})))
            .await;
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["first_close"], 2.0);
        assert_eq!(v["last_close"], 4.0);
    }

    #[tokio::test]
    async fn rejects_missing_or_tiny_input() {
        let out = KlineFeaturesTool.invoke(args(json!({}))).await;
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["ok"], false);

        let out = KlineFeaturesTool
            .invoke(args(json!({"klines": [{"close": "1.0"}], "lookback": 1})))
            .await;
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["ok"], false);
    }
}
