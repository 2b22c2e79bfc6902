pub mod binance;
pub mod indicators;
pub mod snapshot;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use binance::BinanceMarketData;
pub use snapshot::{MarketSnapshot, SnapshotOutcome, build_snapshot};

/// One candlestick as returned by the CEX endpoint. Price fields stay
/// strings on the wire; the snapshot builder parses them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline {
    pub open_time_ms: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub close_time_ms: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("http error: {0}")]
    Http(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Market-data source. Object-safe so tests can swap in a recording stub.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, MarketError>;

    /// Klines plus a computed indicator bundle; infallible by contract.
    async fn snapshot(&self, symbol: &str, interval: &str, limit: u32) -> SnapshotOutcome {
        match self.klines(symbol, interval, limit).await {
            Ok(rows) => build_snapshot(symbol, interval, &rows),
            Err(e) => SnapshotOutcome::Unavailable { error: e.to_string() },
        }
    }
}
