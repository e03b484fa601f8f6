use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Provider returned status {status}")]
    Upstream { status: u16, body: String },

    #[error("Provider unreachable: {0}")]
    Transport(String),

    #[error("Malformed provider payload: {0}")]
    ProviderData(String),

    #[error("Blockchain RPC error: {0}")]
    BlockchainRpc(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Assistant is still thinking, try again shortly")]
    AssistantBusy,

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            AppError::Database(ref e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                e.to_string(),
                None,
            ),
            AppError::BadRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            // Provider said no: pass its status through, keep the body as detail.
            AppError::Upstream { status, ref body } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                "UPSTREAM_ERROR",
                format!("Provider returned status {}", status),
                serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .or_else(|| Some(serde_json::Value::String(body.clone()))),
            ),
            AppError::Transport(ref msg) => (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_UNREACHABLE",
                msg.clone(),
                None,
            ),
            AppError::ProviderData(ref msg) => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_DATA",
                msg.clone(),
                None,
            ),
            AppError::BlockchainRpc(ref msg) => {
                (StatusCode::BAD_GATEWAY, "RPC_ERROR", msg.clone(), None)
            }
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::AssistantBusy => (
                StatusCode::TOO_MANY_REQUESTS,
                "ASSISTANT_BUSY",
                "Assistant is still thinking, try again shortly".to_string(),
                None,
            ),
            AppError::Internal(ref msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
