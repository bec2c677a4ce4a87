use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::pipeline::PipelineError;

/// Transport-level error mapping for pipeline failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("request timed out")]
    Timeout,

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl From<PipelineError> for GatewayError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InputInvalid { reason } => GatewayError::InvalidRequest { reason },
            PipelineError::DeadlineExceeded { .. } => GatewayError::Timeout,
            PipelineError::Cancelled => GatewayError::Internal {
                reason: "request cancelled".to_string(),
            },
            PipelineError::Internal { reason } => GatewayError::Internal { reason },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GatewayError::InvalidRequest { reason } => {
                (StatusCode::BAD_REQUEST, reason.clone())
            }
            GatewayError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "le traitement de la requête a dépassé le délai imparti".to_string(),
            ),
            GatewayError::Internal { reason } => {
                tracing::error!(reason, "internal gateway error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "une erreur interne est survenue".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "detail": message }))).into_response()
    }
}
