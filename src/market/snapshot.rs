use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};

use super::Kline;
use super::indicators::{bollinger, ema, last_finite, macd, rsi};

/// How many rows count as the "24h" window on the default 1h interval.
const DAY_WINDOW: usize = 24;
/// Indicator math needs some history before the latest values exist.
const MIN_ROWS: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct PricePanel {
    pub current: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub change_24h_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumePanel {
    pub current: f64,
    pub avg_24h: f64,
    pub ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndicatorPanel {
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_middle: Option<f64>,
    pub bollinger_lower: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub interval: String,
    pub timestamp: String,
    pub price: PricePanel,
    pub volume: VolumePanel,
    pub indicators: IndicatorPanel,
}

/// Snapshot fetching never fails; the error case travels as data.
#[derive(Debug, Clone)]
pub enum SnapshotOutcome {
    Ready(MarketSnapshot),
    Unavailable { error: String },
}

impl SnapshotOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, SnapshotOutcome::Ready(_))
    }

    pub fn ready(&self) -> Option<&MarketSnapshot> {
        match self {
            SnapshotOutcome::Ready(s) => Some(s),
            SnapshotOutcome::Unavailable { .. } => None,
        }
    }

    /// Wire shape: `{ok: true, ...snapshot}` or `{ok: false, error}`.
    pub fn to_value(&self) -> Value {
        match self {
            SnapshotOutcome::Ready(s) => {
                let mut v = serde_json::to_value(s).unwrap_or_else(|_| json!({}));
                if let Some(obj) = v.as_object_mut() {
                    obj.insert("ok".into(), Value::Bool(true));
                }
                v
            }
            SnapshotOutcome::Unavailable { error } => json!({"ok": false, "error": error}),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn tail(values: &[f64], n: usize) -> &[f64] {
    if values.len() >= n { &values[values.len() - n..] } else { values }
}

/// Compute the indicator bundle over parsed kline rows.
pub fn build_snapshot(symbol: &str, interval: &str, rows: &[Kline]) -> SnapshotOutcome {
    if rows.len() < MIN_ROWS {
        return SnapshotOutcome::Unavailable { error: "insufficient data".into() };
    }

    let mut highs = Vec::with_capacity(rows.len());
    let mut lows = Vec::with_capacity(rows.len());
    let mut closes = Vec::with_capacity(rows.len());
    let mut volumes = Vec::with_capacity(rows.len());
    for k in rows {
        let parsed = (
            k.high.parse::<f64>(),
            k.low.parse::<f64>(),
            k.close.parse::<f64>(),
            k.volume.parse::<f64>(),
        );
        let (Ok(h), Ok(l), Ok(c), Ok(v)) = parsed else {
            return SnapshotOutcome::Unavailable { error: "non-numeric kline row".into() };
        };
        highs.push(h);
        lows.push(l);
        closes.push(c);
        volumes.push(v);
    }

    let current_price = *closes.last().expect("non-empty");
    let price_24h_ago = closes[0];
    let price_change_pct = if price_24h_ago > 0.0 {
        (current_price - price_24h_ago) / price_24h_ago * 100.0
    } else {
        0.0
    };

    let vol_window = tail(&volumes, DAY_WINDOW);
    let avg_volume = vol_window.iter().sum::<f64>() / vol_window.len() as f64;
    let current_volume = *volumes.last().expect("non-empty");
    let volume_ratio = if avg_volume > 0.0 { current_volume / avg_volume } else { 1.0 };

    let (macd_line, macd_signal, macd_hist) = macd(&closes, 12, 26, 9);
    let rsi_14 = rsi(&closes, 14);
    let ema_12 = ema(&closes, 12);
    let ema_26 = ema(&closes, 26);
    let (bb_upper, bb_middle, bb_lower) = bollinger(&closes, 20);

    let high_24h = tail(&highs, DAY_WINDOW).iter().cloned().fold(f64::MIN, f64::max);
    let low_24h = tail(&lows, DAY_WINDOW).iter().cloned().fold(f64::MAX, f64::min);

    SnapshotOutcome::Ready(MarketSnapshot {
        symbol: symbol.to_string(),
        interval: interval.to_string(),
        timestamp: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        price: PricePanel {
            current: round2(current_price),
            high_24h: round2(high_24h),
            low_24h: round2(low_24h),
            change_24h_pct: round2(price_change_pct),
        },
        volume: VolumePanel {
            current: round2(current_volume),
            avg_24h: round2(avg_volume),
            ratio: round2(volume_ratio),
        },
        indicators: IndicatorPanel {
            rsi_14: last_finite(&rsi_14).map(round2),
            macd: last_finite(&macd_line).map(round4),
            macd_signal: last_finite(&macd_signal).map(round4),
            macd_histogram: last_finite(&macd_hist).map(round4),
            ema_12: last_finite(&ema_12).map(round2),
            ema_26: last_finite(&ema_26).map(round2),
            bollinger_upper: last_finite(&bb_upper).map(round2),
            bollinger_middle: last_finite(&bb_middle).map(round2),
            bollinger_lower: last_finite(&bb_lower).map(round2),
        },
    })
}
