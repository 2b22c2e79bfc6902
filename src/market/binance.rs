use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{BINANCE_FALLBACK_BASE_URL, CexConfig, DEFAULT_BINANCE_BASE_URL};

use super::{Kline, MarketData, MarketError};

/// Public Binance klines endpoint with a regional fallback host.
pub struct BinanceMarketData {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceMarketData {
    pub fn new(cfg: &CexConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(cfg.timeout_s))
            .build()
            .unwrap_or_default();
        BinanceMarketData { client, base_url: cfg.base_url.clone() }
    }

    async fn fetch(
        &self,
        base: &str,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, MarketError> {
        let url = format!("{}/api/v3/klines", base.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("interval", interval),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| MarketError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| MarketError::Http(e.to_string()))?;

        let data: Value = resp
            .json()
            .await
            .map_err(|e| MarketError::Http(e.to_string()))?;
        parse_kline_rows(&data)
    }
}

#[async_trait]
impl MarketData for BinanceMarketData {
    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, MarketError> {
        match self.fetch(&self.base_url, symbol, interval, limit).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                if self.base_url.contains(DEFAULT_BINANCE_BASE_URL.trim_start_matches("https://")) {
                    tracing::warn!(error = %e, "primary CEX host failed, trying fallback");
                    self.fetch(BINANCE_FALLBACK_BASE_URL, symbol, interval, limit).await
                } else {
                    Err(e)
                }
            }
        }
    }
}

/// Binance returns klines as positional arrays; rows with fewer than 7
/// columns are skipped.
pub fn parse_kline_rows(data: &Value) -> Result<Vec<Kline>, MarketError> {
    let rows = data
        .as_array()
        .ok_or_else(|| MarketError::UnexpectedResponse("expected a JSON array".into()))?;

    let mut klines = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(cols) = row.as_array() else { continue };
        if cols.len() < 7 {
            continue;
        }
        let (Some(open_time), Some(close_time)) = (cols[0].as_i64(), cols[6].as_i64()) else {
            continue;
        };
        klines.push(Kline {
            open_time_ms: open_time,
            open: value_as_string(&cols[1]),
            high: value_as_string(&cols[2]),
            low: value_as_string(&cols[3]),
            close: value_as_string(&cols[4]),
            volume: value_as_string(&cols[5]),
            close_time_ms: close_time,
        });
    }
    Ok(klines)
}

fn value_as_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_positional_rows() {
        let data = json!([
            [1, "1.0", "2.0", "0.5", "1.5", "10", 2],
            [2, "1.5", "2.5", "1.0", "2.0", "11", 3],
            [3, "short row"]
        ]);
        let rows = parse_kline_rows(&data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].open, "1.0");
        assert_eq!(rows[1].close_time_ms, 3);
    }

    #[test]
    fn rejects_non_array_payload() {
        assert!(parse_kline_rows(&json!({"msg": "rate limited"})).is_err());
    }
}
