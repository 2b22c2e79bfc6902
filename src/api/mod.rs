pub mod error;
pub mod handlers;
pub mod state;
pub mod types;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { axum::Json(json!({"status": "ok"})) }))
        .route("/chat", post(handlers::chat::chat))
        .route("/chat/stream", post(handlers::chat_stream::chat_stream))
        .route("/cross-chain/intents", post(handlers::cross_chain::create_intent))
        .route("/cross-chain/intents/{id}", get(handlers::cross_chain::get_intent))
        .route("/cross-chain/intents/{id}/cancel", post(handlers::cross_chain::cancel_intent))
        .route("/cross-chain/intents/{id}/refund", post(handlers::cross_chain::refund_intent))
        .route("/cross-chain/inbound", post(handlers::cross_chain::inbound))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(host: &str, port: u16, state: AppState) -> Result<()> {
    let app = router(state);
    let addr = format!("{host}:{port}");

    tracing::info!("intent-flow API server listening on {addr}");
    tracing::info!("  Health:      GET  http://{addr}/health");
    tracing::info!("  Chat:        POST http://{addr}/chat");
    tracing::info!("  Chat (SSE):  POST http://{addr}/chat/stream");
    tracing::info!("  Cross-chain: POST http://{addr}/cross-chain/intents");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    axum::serve(listener, app).await.context("running server")?;
    Ok(())
}
