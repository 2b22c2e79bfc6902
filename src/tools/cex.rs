use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::clock::unix_now_s;
use crate::config::CexConfig;
use crate::intent::normalize_cex_symbol;
use crate::market::MarketData;

use super::{Tool, ToolDescriptor, arg_str};

/// Fetch recent klines from the CEX public API.
pub struct CexKlinesTool {
    cfg: CexConfig,
    market: Arc<dyn MarketData>,
}

impl CexKlinesTool {
    pub fn new(cfg: CexConfig, market: Arc<dyn MarketData>) -> Self {
        CexKlinesTool { cfg, market }
    }

    fn error(&self, args: &Map<String, Value>, kind: &str, message: &str) -> String {
        json!({
            "ok": false,
            "source": "cex_binance",
            "symbol": args.get("symbol").cloned().unwrap_or(Value::Null),
            "interval": args.get("interval").cloned().unwrap_or(Value::Null),
            "limit": args.get("limit").cloned().unwrap_or(Value::Null),
            "error": {"type": kind, "message": message},
        })
        .to_string()
    }
}

#[async_trait]
impl Tool for CexKlinesTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_cex_klines".into(),
            description: "Fetch recent klines from the Binance public API. Symbol may be \
                          a full pair like BTCUSDT or a bare base like BTC (defaults to \
                          the USDT quote)."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": {
                        "type": "string",
                        "description": "Trading symbol, e.g. \"BTCUSDT\" or \"BTC\"."
                    },
                    "interval": {
                        "type": "string",
                        "description": "Kline interval, e.g. \"1m\", \"5m\", \"1h\", \"1d\"."
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Number of klines (1-1000)."
                    }
                },
                "required": ["symbol"]
            }),
        }
    }

    async fn invoke(&self, args: Map<String, Value>) -> String {
        let Some(symbol_raw) = arg_str(&args, "symbol") else {
            return self.error(&args, "InvalidInput", "symbol is required");
        };
        let symbol = match normalize_cex_symbol(&symbol_raw, &self.cfg.default_quote) {
            Ok(s) => s,
            Err(e) => return self.error(&args, "InvalidInput", &e.to_string()),
        };

        let interval = arg_str(&args, "interval")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.cfg.kline_interval.clone());
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(self.cfg.kline_limit as u64);
        if limit == 0 || limit > 1000 {
            return self.error(&args, "InvalidInput", "limit must be between 1 and 1000");
        }

        match self.market.klines(&symbol, &interval, limit as u32).await {
            Ok(rows) => json!({
                "ok": true,
                "source": "cex_binance",
                "symbol": symbol,
                "interval": interval,
                "limit": limit,
                "klines": rows,
                "timestamp_unix_s": unix_now_s(),
            })
            .to_string(),
            Err(e) => self.error(&args, "HttpError", &e.to_string()),
        }
    }
}
