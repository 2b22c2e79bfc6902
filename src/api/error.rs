use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use crate::crosschain::ServiceError;
use crate::crosschain::store::StoreError;
use crate::llm::{ModelError, PlannerError};

/// Request-level failures carrying the stable error-code vocabulary.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    InvalidInput(String),
    InputTooLarge(String),
    NotReady(String),
    LlmTimeout(String),
    UpstreamTimeout(String),
    UpstreamNetwork(String),
    NotFound(String),
    CannotCancel(String),
    CannotRefund(String),
    Unauthorized(String),
    UnverifiedInbound(String),
    UnsupportedConnector(String),
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::InputTooLarge(_) => "input_too_large",
            ApiError::NotReady(_) => "not_ready",
            ApiError::LlmTimeout(_) => "llm_timeout",
            ApiError::UpstreamTimeout(_) => "upstream_timeout",
            ApiError::UpstreamNetwork(_) => "upstream_network_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::CannotCancel(_) => "cannot_cancel",
            ApiError::CannotRefund(_) => "cannot_refund",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::UnverifiedInbound(_) => "unverified_inbound",
            ApiError::UnsupportedConnector(_) => "unsupported_connector",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Validation(m)
            | ApiError::InvalidInput(m)
            | ApiError::InputTooLarge(m)
            | ApiError::NotReady(m)
            | ApiError::LlmTimeout(m)
            | ApiError::UpstreamTimeout(m)
            | ApiError::UpstreamNetwork(m)
            | ApiError::NotFound(m)
            | ApiError::CannotCancel(m)
            | ApiError::CannotRefund(m)
            | ApiError::Unauthorized(m)
            | ApiError::UnverifiedInbound(m)
            | ApiError::UnsupportedConnector(m)
            | ApiError::Internal(m) => m,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InvalidInput(_)
            | ApiError::UnverifiedInbound(_)
            | ApiError::UnsupportedConnector(_) => StatusCode::BAD_REQUEST,
            ApiError::InputTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::LlmTimeout(_) | ApiError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::UpstreamNetwork(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::CannotCancel(_) | ApiError::CannotRefund(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn envelope(&self) -> Value {
        json!({"code": self.code(), "message": self.message()})
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}

impl From<PlannerError> for ApiError {
    fn from(err: PlannerError) -> Self {
        match err {
            PlannerError::Model(ModelError::Timeout) => ApiError::LlmTimeout(
                "Upstream LLM request timed out. Check network/proxy and the provider base URL."
                    .into(),
            ),
            PlannerError::Model(ModelError::UpstreamTimeout(_)) => ApiError::UpstreamTimeout(
                "Upstream LLM request timed out. Check network/proxy and the provider base URL."
                    .into(),
            ),
            PlannerError::Model(ModelError::Network(m)) => ApiError::UpstreamNetwork(format!(
                "Upstream connection failed: {m}. Check network/proxy and the provider base URL."
            )),
            PlannerError::Model(ModelError::Protocol(m)) => {
                ApiError::UpstreamNetwork(format!("Upstream protocol error: {m}"))
            }
            PlannerError::Model(ModelError::EmptyResponse) => {
                ApiError::Internal("model_empty_response".into())
            }
            PlannerError::ToolCallLimitExceeded => {
                ApiError::Internal("tool_call_limit_exceeded".into())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("intent not found".into()),
            StoreError::CannotCancel => ApiError::CannotCancel("intent cannot be cancelled".into()),
            StoreError::CannotRefund => ApiError::CannotRefund("intent cannot be refunded".into()),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::UnsupportedConnector => {
                ApiError::UnsupportedConnector("Unsupported connector".into())
            }
            ServiceError::UnverifiedInbound => {
                ApiError::UnverifiedInbound("Inbound message not verified".into())
            }
            ServiceError::Store(e) => e.into(),
        }
    }
}
