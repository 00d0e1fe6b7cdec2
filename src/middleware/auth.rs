//! Authentication enforcement for protected route groups
//!
//! Reads the credential from the configured cookie, verifies it and stores
//! the resulting [`ClaimSet`] in the request extensions. Any failure answers
//! 401 and the request never reaches the forwarder.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use metrics::counter;
use std::sync::Arc;

use crate::config::JwtConfig;
use crate::error::AppError;
use crate::jwt::{AuthError, ClaimSet, ClaimVerifier};

/// Shared state for authentication middleware
#[derive(Clone)]
pub struct AuthMiddlewareState {
    verifier: ClaimVerifier,
    cookie_name: Arc<str>,
}

impl AuthMiddlewareState {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            verifier: ClaimVerifier::new(config),
            cookie_name: Arc::from(config.cookie_name.as_str()),
        }
    }

    /// Verify the credential cookie of a request
    pub fn authenticate(&self, jar: &CookieJar) -> Result<ClaimSet, AuthError> {
        let cookie = jar
            .get(&self.cookie_name)
            .ok_or(AuthError::MissingToken)?;
        self.verifier.verify(cookie.value())
    }
}

/// Authentication enforcement middleware
pub async fn require_auth_middleware(
    State(auth_state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());

    match auth_state.authenticate(&jar) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(err) => {
            let reason = match err {
                AuthError::MissingToken => "missing",
                AuthError::TokenExpired => "expired",
                AuthError::InvalidToken(_) => "invalid",
            };
            counter!("gateway_auth_rejections_total", "reason" => reason).increment(1);
            AppError::from(err).into_response()
        }
    }
}
