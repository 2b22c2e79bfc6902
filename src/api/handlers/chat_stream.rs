use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::plan::strategy_label;
use crate::sse::{AssistantTextExtractor, chunk_text, sse_event};

use super::super::error::ApiError;
use super::super::state::AppState;
use super::super::types::ChatRequest;
use super::chat::{ChatOutcome, run_chat, validate_chat_request};

/// How often the generator polls the background planner task.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Bounded queues between the model stream, the extractor and the SSE pump.
const DELTA_QUEUE_CAPACITY: usize = 256;

/// Aborts the planner when the SSE body is dropped (client disconnect).
struct AbortOnDrop(JoinHandle<Result<ChatOutcome, ApiError>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// POST /chat/stream
pub async fn chat_stream(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let (session_id, user_input) = validate_chat_request(&state, payload)?;

    let stream_cfg = state.config.stream.clone();
    let upstream_streaming = state.config.llm.upstream_streaming;

    // Raw model deltas flow through the extractor into the SSE queue.
    let (sse_tx, mut sse_rx) = mpsc::channel::<String>(DELTA_QUEUE_CAPACITY);
    let on_delta = if upstream_streaming {
        let (raw_tx, mut raw_rx) = mpsc::channel::<String>(DELTA_QUEUE_CAPACITY);
        tokio::spawn(async move {
            let mut extractor = AssistantTextExtractor::new();
            while let Some(delta) = raw_rx.recv().await {
                let text = extractor.feed(&delta);
                if !text.is_empty() && sse_tx.send(text).await.is_err() {
                    break;
                }
            }
        });
        Some(raw_tx)
    } else {
        drop(sse_tx);
        None
    };

    let mut task = AbortOnDrop(tokio::spawn(run_chat(
        state,
        session_id.clone(),
        user_input,
        on_delta,
    )));

    let body_stream = async_stream::stream! {
        yield Ok::<String, Infallible>(": connected\n\n".to_string());

        let started = Instant::now();
        let mut last_keepalive = Instant::now();
        let mut seq: u64 = 0;
        let mut emitted_any = false;

        let chunk_payload = |session_id: &str, seq: u64, delta: &str| {
            json!({"session_id": session_id, "sequence": seq, "delta_text": delta})
        };

        let join_result = loop {
            if stream_cfg.total_timeout_s > 0.0
                && started.elapsed().as_secs_f64() >= stream_cfg.total_timeout_s
            {
                yield Ok(sse_event("error", &json!({
                    "session_id": session_id,
                    "code": "upstream_timeout",
                    "message": "Timed out while generating strategy. Check upstream LLM/network and try again.",
                })));
                return;
            }

            if stream_cfg.keepalive_s > 0.0
                && last_keepalive.elapsed().as_secs_f64() >= stream_cfg.keepalive_s
            {
                last_keepalive = Instant::now();
                yield Ok(": keep-alive\n\n".to_string());
            }

            while let Ok(delta) = sse_rx.try_recv() {
                emitted_any = true;
                yield Ok(sse_event("chunk", &chunk_payload(&session_id, seq, &delta)));
                seq += 1;
            }

            match tokio::time::timeout(POLL_INTERVAL, &mut task.0).await {
                Ok(join_result) => break join_result,
                Err(_) => continue,
            }
        };

        let outcome = match join_result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(api_err)) => {
                yield Ok(sse_event("error", &json!({
                    "session_id": session_id,
                    "code": api_err.code(),
                    "message": api_err.message(),
                })));
                return;
            }
            Err(join_err) => {
                yield Ok(sse_event("error", &json!({
                    "session_id": session_id,
                    "code": "stream_error",
                    "message": join_err.to_string(),
                })));
                return;
            }
        };

        // Whatever the extractor produced after the last poll.
        while let Ok(delta) = sse_rx.try_recv() {
            emitted_any = true;
            yield Ok(sse_event("chunk", &chunk_payload(&session_id, seq, &delta)));
            seq += 1;
        }

        // Nothing streamed upstream: chunk the final text ourselves.
        if !upstream_streaming || !emitted_any {
            for part in chunk_text(&outcome.assistant_text, stream_cfg.chunk_size) {
                yield Ok(sse_event("chunk", &chunk_payload(&session_id, seq, &part)));
                seq += 1;
                if stream_cfg.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(stream_cfg.delay_ms)).await;
                }
            }
        }

        let strategy_type = outcome.actions.first().map(|a| a.action_type.clone());
        let mut done = json!({
            "session_id": session_id,
            "assistant_text": outcome.assistant_text,
            "actions": outcome.actions,
            "execution_preview": outcome.execution_preview,
        });
        if let Some(plan) = outcome.execution_plan {
            done["execution_plan"] = plan;
        }
        done["strategy_type"] = strategy_type
            .as_deref()
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null);
        done["strategy_label"] = Value::String(strategy_label(strategy_type.as_deref()));
        yield Ok(sse_event("done", &done));
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));

    Ok((StatusCode::OK, headers, Body::from_stream(body_stream)).into_response())
}
