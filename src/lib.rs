//! API Gateway - edge component for the user and payment services
//!
//! Authenticates inbound requests from the `authorization` cookie, rewrites
//! exposed paths to the versioned backend API and forwards traffic to the
//! backend that owns the route.

pub mod config;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
