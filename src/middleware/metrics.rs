//! HTTP observability middleware
//!
//! Implemented as a Tower Layer/Service. Propagates `X-Request-Id` to the
//! backend and back to the caller, and records request metrics.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    response::Response,
};
use metrics::{counter, gauge, histogram};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Tower Layer for HTTP observability (request ID + metrics).
#[derive(Clone)]
pub struct ObservabilityLayer;

impl<S> Layer<S> for ObservabilityLayer {
    type Service = ObservabilityMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObservabilityMiddleware { inner }
    }
}

/// Tower Service that records HTTP metrics and propagates request IDs.
#[derive(Clone)]
pub struct ObservabilityMiddleware<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for ObservabilityMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let method = request.method().to_string();
        let route = route_label(request.uri().path());

        // Reuse the caller's request ID, or mint one the backend will see too
        let request_id = match request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                if let Ok(value) = HeaderValue::from_str(&id) {
                    request.headers_mut().insert(X_REQUEST_ID, value);
                }
                id
            }
        };

        let in_flight = InFlightGuard::enter();
        let start = Instant::now();

        // Take the service that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let span = tracing::info_span!("gateway", request_id = %request_id);

        Box::pin(
            async move {
                let result = inner.call(request).await;
                drop(in_flight);
                let mut response = result?;

                let duration = start.elapsed().as_secs_f64();
                let status = response.status().as_u16().to_string();

                counter!("gateway_http_requests_total", "method" => method.clone(), "route" => route, "status" => status)
                    .increment(1);
                histogram!("gateway_http_request_duration_seconds", "method" => method, "route" => route)
                    .record(duration);

                if !response.headers().contains_key(X_REQUEST_ID) {
                    if let Ok(value) = HeaderValue::from_str(&request_id) {
                        response.headers_mut().insert(X_REQUEST_ID, value);
                    }
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}

/// Holds one slot of the in-flight gauge. Released on drop, so a request
/// whose future is dropped on client disconnect is still counted out.
struct InFlightGuard;

impl InFlightGuard {
    fn enter() -> Self {
        gauge!("gateway_http_requests_in_flight").increment(1.0);
        InFlightGuard
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!("gateway_http_requests_in_flight").decrement(1.0);
    }
}

/// Metric label for a path. Only known routes get their own label so that
/// scanners cannot blow up label cardinality.
fn route_label(path: &str) -> &'static str {
    match path {
        "/user" => "/user",
        "/user/login" => "/user/login",
        "/payments/deposit" => "/payments/deposit",
        "/payments/withdraw" => "/payments/withdraw",
        "/payments/transfer" => "/payments/transfer",
        "/payments/confirm" => "/payments/confirm",
        "/payments/cancel" => "/payments/cancel",
        "/version" => "/version",
        "/metrics" => "/metrics",
        _ => "other",
    }
}
