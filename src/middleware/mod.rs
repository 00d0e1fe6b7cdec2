//! HTTP middleware for the API Gateway
//!
//! - Cookie credential enforcement for the payment group
//! - Request ID propagation and request metrics
//! - Span maker that keeps query strings and cookies out of logs

pub mod auth;
pub mod metrics;
pub mod trace;

pub use auth::{require_auth_middleware, AuthMiddlewareState};
pub use metrics::ObservabilityLayer;
pub use trace::RedactedMakeSpan;
