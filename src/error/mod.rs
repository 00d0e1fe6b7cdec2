//! Unified error handling for the API Gateway
//!
//! Every variant answers with a bare status code. Details are logged, never
//! written to the response body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Identity-requiring route reached without a verified claim set
    #[error("Identity missing from request context")]
    IdentityMissing,

    /// `user_id` claim present but not representable as a header value
    #[error("Identity claim malformed: {0}")]
    IdentityMalformed(String),

    #[error("Backend {service} timed out: {source}")]
    BackendTimeout {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Backend {service} unreachable: {source}")]
    BackendUnreachable {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) | AppError::IdentityMissing => StatusCode::UNAUTHORIZED,
            AppError::IdentityMalformed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::BackendUnreachable { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Classify a backend client failure
    pub fn from_backend(service: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            AppError::BackendTimeout { service, source }
        } else {
            AppError::BackendUnreachable { service, source }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Unauthorized(reason) => {
                tracing::debug!("Rejecting request: {}", reason);
            }
            AppError::IdentityMissing => {
                tracing::warn!("Identity-requiring route reached without verified claims");
            }
            AppError::IdentityMalformed(shape) => {
                tracing::error!("Cannot normalize user_id claim: {}", shape);
            }
            AppError::BackendTimeout { service, source } => {
                tracing::error!(service = %service, "Backend timed out: {:?}", source);
            }
            AppError::BackendUnreachable { service, source } => {
                tracing::error!(service = %service, "Backend unreachable: {:?}", source);
            }
        }

        self.status_code().into_response()
    }
}
