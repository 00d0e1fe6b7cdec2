//! Server initialization and routing
//!
//! Binds every exposed method and path to exactly one service group. The
//! payment group sits behind the credential check; the user group does not.
//! Anything else is answered by the router's own 404.

use crate::config::{Config, CorsConfig};
use crate::error::Result;
use crate::middleware::{require_auth_middleware, ObservabilityLayer, RedactedMakeSpan};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    response::Response,
    routing::{get, get_service, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeFile,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Run the server
pub async fn run(config: Config, prometheus: Option<PrometheusHandle>) -> anyhow::Result<()> {
    let http_addr = config.http_addr();
    let state = AppState::from_config(config)?;

    info!(
        user = %format!("{}://{}", state.user.target.scheme, state.user.target.host),
        payment = %format!("{}://{}", state.payment.target.scheme, state.payment.target.host),
        "Backend targets resolved"
    );

    let app = build_router(state, prometheus);

    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");
    Ok(())
}

/// Build the HTTP router
///
/// `/metrics` is mounted only when a Prometheus handle is supplied.
pub fn build_router(state: AppState, prometheus: Option<PrometheusHandle>) -> Router {
    let cors = cors_layer(&state.config.cors);
    let version_file = ServeFile::new(&state.config.version_file);

    let user_routes = Router::new()
        .route("/user", post(forward_user))
        .route("/user/login", post(forward_user));

    let payment_routes = Router::new()
        .route("/payments/deposit", post(forward_payment_as_caller))
        .route("/payments/withdraw", post(forward_payment_as_caller))
        .route("/payments/transfer", post(forward_payment))
        .route("/payments/confirm", post(forward_payment))
        .route("/payments/cancel", post(forward_payment))
        // route_layer: unmatched paths stay 404 instead of 401
        .route_layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            require_auth_middleware,
        ));

    let mut router = Router::new()
        .route("/version", get_service(version_file))
        .merge(user_routes)
        .merge(payment_routes);

    if let Some(handle) = prometheus {
        router = router.route("/metrics", get(move || std::future::ready(handle.render())));
    }

    router
        .layer(ObservabilityLayer)
        .layer(TraceLayer::new_for_http().make_span_with(RedactedMakeSpan))
        .layer(cors)
        .with_state(state)
}

async fn forward_user(State(state): State<AppState>, request: Request) -> Result<Response> {
    state.forwarder.forward(request, &state.user, None).await
}

async fn forward_payment(State(state): State<AppState>, request: Request) -> Result<Response> {
    state.forwarder.forward(request, &state.payment, None).await
}

async fn forward_payment_as_caller(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response> {
    state
        .forwarder
        .forward_with_identity(request, &state.payment)
        .await
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            // A wildcard in the list would panic inside the CORS layer
            Ok(value) if value != "*" => Some(value),
            _ => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(config.max_age_secs))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
