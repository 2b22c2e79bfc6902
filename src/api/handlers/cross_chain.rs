use axum::Json;
use axum::extract::{Path, State};
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use serde_json::{Value, json};

use crate::crosschain::types::{InboundRequest, IntentCreateRequest, IntentRecord};

use super::super::error::ApiError;
use super::super::state::AppState;

const INBOUND_AUTH_HEADER: &str = "x-crosschain-auth";

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(v)| v).map_err(|e| ApiError::Validation(e.body_text()))
}

/// POST /cross-chain/intents
pub async fn create_intent(
    State(state): State<AppState>,
    payload: Result<Json<IntentCreateRequest>, JsonRejection>,
) -> Result<Json<IntentRecord>, ApiError> {
    let req = parse_body(payload)?;
    let intent = state.cross_chain.create_and_dispatch(req).await?;
    Ok(Json(intent))
}

/// GET /cross-chain/intents/{id}
pub async fn get_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
) -> Result<Json<IntentRecord>, ApiError> {
    let intent = state
        .cross_chain
        .store
        .get_intent(&intent_id)
        .await
        .ok_or_else(|| ApiError::NotFound("intent not found".into()))?;
    Ok(Json(intent))
}

/// POST /cross-chain/intents/{id}/cancel
pub async fn cancel_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
) -> Result<Json<IntentRecord>, ApiError> {
    let intent = state.cross_chain.store.cancel_intent(&intent_id).await?;
    Ok(Json(intent))
}

/// POST /cross-chain/intents/{id}/refund
pub async fn refund_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
) -> Result<Json<IntentRecord>, ApiError> {
    let intent = state.cross_chain.store.refund_intent(&intent_id).await?;
    Ok(Json(intent))
}

/// POST /cross-chain/inbound, guarded by the shared-secret header.
pub async fn inbound(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<InboundRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let expected = state.config.crosschain_inbound_token.trim();
    if expected.is_empty() {
        return Err(ApiError::NotReady("Inbound token not configured".into()));
    }
    let provided = headers
        .get(INBOUND_AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided != expected {
        return Err(ApiError::Unauthorized("Invalid inbound auth".into()));
    }

    let req = parse_body(payload)?;
    let (intent, applied) = state.cross_chain.apply_verified_inbound(&req).await?;
    Ok(Json(json!({"applied": applied, "intent": intent})))
}
