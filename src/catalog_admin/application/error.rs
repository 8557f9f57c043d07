use thiserror::Error;
use crate::domain::error::DomainError; // ドメインエラーをラップするため
use crate::infrastructure::error::InfrastructureError; // InfrastructureError をラップするため

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid request method.")]
    MethodNotAllowed,

    #[error("Image processing task failed: {0}")]
    TaskFailed(String),

    #[error("{0}")]
    DomainError(#[from] DomainError), // ドメインエラーをラップ

    #[error("{0}")]
    InfrastructureError(#[from] InfrastructureError), // InfrastructureError をラップ
}

impl ApplicationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApplicationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApplicationError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApplicationError::TaskFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApplicationError::DomainError(domain_err) => domain_status(domain_err),
            ApplicationError::InfrastructureError(infra_err) => match infra_err {
                InfrastructureError::DomainErrorWrapper(domain_err) => domain_status(domain_err),
                InfrastructureError::SourceMissing(_) => StatusCode::NOT_FOUND,
                // バックアップ・書き込み・移動の失敗はサーバー側の問題
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DomainError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        DomainError::CorruptData(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::ResourceExhausted(_) => StatusCode::PAYLOAD_TOO_LARGE,
        DomainError::EncodeFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// IntoResponse implementation for ApplicationError
use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

impl IntoResponse for ApplicationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {:?}", self);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), self);
        }
        let body = Json(json!({ "status": "error", "message": self.to_string() }));
        (status, body).into_response()
    }
}
