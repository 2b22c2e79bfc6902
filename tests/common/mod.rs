// Not every helper is used by every test binary.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use intent_flow::api::router;
use intent_flow::api::state::AppState;
use intent_flow::config::AppConfig;
use intent_flow::llm::ContentBlock;
use intent_flow::llm::model::{ChatModel, ModelError, ModelRequest, ModelResponse};
use intent_flow::market::{Kline, MarketData, MarketError};

// ── Fakes ────────────────────────────────────────────────────────────

/// Replays a fixed plan JSON and mirrors it into the delta sink like a
/// non-streaming provider would.
pub struct FakeModel {
    plan: Value,
}

impl FakeModel {
    pub fn chat_ok() -> Self {
        FakeModel {
            plan: json!({
                "intent": "chat",
                "params": {},
                "assistant_text": "ok",
                "rationale": "ok",
                "risk_notes": [],
                "actions": [],
            }),
        }
    }

    pub fn with_dca_action() -> Self {
        FakeModel {
            plan: json!({
                "intent": "chat",
                "params": {"symbol": "BTCUSDT"},
                "assistant_text": "ok",
                "rationale": "ok",
                "risk_notes": [],
                "actions": [{"type": "start_dca", "params": {"symbol": "BTCUSDT", "quote": "USDT"}}],
            }),
        }
    }
}

#[async_trait]
impl ChatModel for FakeModel {
    async fn chat(&self, req: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let text = self.plan.to_string();
        if let Some(sink) = req.on_delta {
            let _ = sink.send(text.clone()).await;
        }
        Ok(ModelResponse { content: vec![ContentBlock::Text { text }] })
    }
}

/// Serves a deterministic rising series and records the last requested
/// symbol for prefetch assertions.
pub struct StubMarket {
    pub seen_symbol: Mutex<Option<String>>,
}

impl StubMarket {
    pub fn new() -> Self {
        StubMarket { seen_symbol: Mutex::new(None) }
    }
}

#[async_trait]
impl MarketData for StubMarket {
    async fn klines(
        &self,
        symbol: &str,
        _interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, MarketError> {
        *self.seen_symbol.lock().unwrap() = Some(symbol.to_string());
        let n = (limit as i64).clamp(1, 40);
        Ok((0..n)
            .map(|i| Kline {
                open_time_ms: 1_700_000_000_000 + i * 3_600_000,
                open: "100.0".into(),
                high: format!("{}", 101.0 + i as f64),
                low: format!("{}", 99.0 + i as f64),
                close: format!("{}", 100.0 + i as f64),
                volume: "10.0".into(),
                close_time_ms: 1_700_000_000_000 + (i + 1) * 3_600_000,
            })
            .collect())
    }
}

// ── State builders ───────────────────────────────────────────────────

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::from_env();
    config.session_ttl_seconds = 60;
    config.stream.chunk_size = 1000;
    config.stream.delay_ms = 0;
    config.stream.keepalive_s = 0.0;
    config
}

pub fn state_with(config: AppConfig, model: Option<Arc<dyn ChatModel>>) -> (AppState, Arc<StubMarket>) {
    let market = Arc::new(StubMarket::new());
    (AppState::assemble(config, model, market.clone()), market)
}

pub fn app_with_model(model: FakeModel) -> Router {
    let (state, _) = state_with(test_config(), Some(Arc::new(model)));
    router(state)
}

/// Router whose startup was skipped: chat answers not_ready.
pub fn app_without_model() -> Router {
    let (state, _) = state_with(test_config(), None);
    router(state)
}

// ── Request helpers ──────────────────────────────────────────────────

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    split_response(response).await
}

pub async fn post_json_with_header(
    app: &Router,
    uri: &str,
    header_pair: Option<(&str, &str)>,
    body: Value,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some((name, value)) = header_pair {
        builder = builder.header(name, value);
    }
    let request = builder.body(Body::from(body.to_string())).expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    split_response(response).await
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().method("GET").uri(uri).body(Body::empty()).expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    split_response(response).await
}

async fn split_response(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Collect a text/event-stream body and split it into (event, data) pairs.
/// Comment lines are dropped.
pub async fn post_sse(app: &Router, uri: &str, body: Value) -> (StatusCode, Vec<(String, Value)>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let text = String::from_utf8_lossy(&bytes);

    let mut events = Vec::new();
    let mut current_event: Option<String> = None;
    let mut current_data: Option<String> = None;
    for line in text.lines() {
        if line.is_empty() {
            if let (Some(event), Some(data)) = (current_event.take(), current_data.take()) {
                let value = serde_json::from_str(&data).unwrap_or(Value::Null);
                events.push((event, value));
            }
            current_data = None;
            continue;
        }
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            current_event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            current_data = Some(rest.trim().to_string());
        }
    }
    (status, events)
}
