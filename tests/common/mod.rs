//! Common test utilities

#![allow(dead_code)]

use api_gateway::config::{Config, CorsConfig, JwtConfig, ProxyConfig, ServicesConfig};
use api_gateway::server::build_router;
use api_gateway::state::AppState;
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::MockServer;

pub const SECRET: &str = "integration-test-secret-with-enough-length";

pub fn test_config(user_url: &str, payment_url: &str) -> Config {
    Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
        jwt: JwtConfig {
            secret: SECRET.to_string(),
            cookie_name: "authorization".to_string(),
        },
        services: ServicesConfig {
            user_url: user_url.to_string(),
            payment_url: payment_url.to_string(),
        },
        proxy: ProxyConfig::default(),
        cors: CorsConfig::default(),
        version_file: "./version.txt".to_string(),
    }
}

/// Gateway router pointed at two mock backends
pub fn gateway(user: &MockServer, payment: &MockServer) -> Router {
    gateway_with_config(test_config(&user.uri(), &payment.uri()))
}

pub fn gateway_with_config(config: Config) -> Router {
    let state = AppState::from_config(config).expect("test config must be valid");
    build_router(state, None)
}

pub fn sign(alg: Algorithm, secret: &str, claims: &Value) -> String {
    encode(
        &Header::new(alg),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

/// Valid HS256 token for `user_id`, expiring in an hour
pub fn token_for(user_id: Value) -> String {
    sign(
        Algorithm::HS256,
        SECRET,
        &json!({ "exp": Utc::now().timestamp() + 3600, "user_id": user_id }),
    )
}

pub fn credential_cookie(token: &str) -> String {
    format!("authorization={}", token)
}

pub fn post(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("Cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, cookie: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("Cookie", cookie);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
