//! Request forwarding to the backend services
//!
//! The forwarder rewrites scheme, host and path of an inbound request,
//! optionally stamps the caller identity, and streams the backend response
//! back unmodified.

use anyhow::{bail, Context};
use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use metrics::counter;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::config::ProxyConfig;
use crate::error::{AppError, Result};
use crate::jwt::{ClaimSet, UserId};
use crate::routes::{RouteTable, ServiceId};

/// Header carrying the authenticated caller to the backend
pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe one connection and must not cross the proxy
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Scheme and host of one backend service, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub scheme: String,
    /// Host, with the port when the base URL names one
    pub host: String,
}

impl BackendTarget {
    /// Parse a service base URL. Any path on the base URL is ignored.
    pub fn from_url(base_url: &str) -> anyhow::Result<Self> {
        let url = Url::parse(base_url)
            .with_context(|| format!("Invalid backend URL '{}'", base_url))?;

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            bail!("Backend URL '{}' must use http or https", base_url);
        }

        let host = url
            .host_str()
            .with_context(|| format!("Backend URL '{}' has no host", base_url))?;

        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            scheme: scheme.to_string(),
            host,
        })
    }

    /// Absolute URL on this backend for a rewritten path
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) => format!("{}://{}{}?{}", self.scheme, self.host, path, q),
            None => format!("{}://{}{}", self.scheme, self.host, path),
        }
    }
}

/// Everything needed to forward one route group
#[derive(Debug, Clone)]
pub struct ServiceGroup {
    pub service: ServiceId,
    pub target: BackendTarget,
    pub routes: RouteTable,
}

impl ServiceGroup {
    pub fn new(service: ServiceId, base_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            service,
            target: BackendTarget::from_url(base_url)?,
            routes: RouteTable::for_service(service),
        })
    }
}

/// Forwards requests over a shared connection pool
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(config: &ProxyConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            // Redirects belong to the caller
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to create backend HTTP client")?;

        Ok(Self { client })
    }

    /// Forward on a route that must carry the caller identity.
    ///
    /// The claim set is taken from the request extensions, where the auth
    /// middleware left it. Without one the request is refused with 401; an
    /// identity that cannot be normalized is refused with 500.
    pub async fn forward_with_identity(
        &self,
        request: Request,
        group: &ServiceGroup,
    ) -> Result<Response> {
        let claim = request
            .extensions()
            .get::<ClaimSet>()
            .and_then(|claims| claims.user_id.clone())
            .ok_or(AppError::IdentityMissing)?;

        let user_id = claim.to_user_id()?;
        self.forward(request, group, Some(user_id)).await
    }

    /// Rewrite the request for `group` and stream the backend's answer back.
    pub async fn forward(
        &self,
        request: Request,
        group: &ServiceGroup,
        identity: Option<UserId>,
    ) -> Result<Response> {
        let (parts, body) = request.into_parts();

        let path = group.routes.resolve(parts.uri.path());
        let url = group.target.url_for(path, parts.uri.query());

        let client_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let mut headers = outbound_headers(&parts.headers, client_addr);

        let destination = format!("{}://{}{}", group.target.scheme, group.target.host, path);
        match &identity {
            Some(user_id) => {
                let value = HeaderValue::from_str(user_id.as_str())
                    .map_err(|_| AppError::IdentityMalformed("invalid header value".to_string()))?;
                headers.insert(X_USER_ID, value);
                info!(service = %group.service, user_id = %user_id, "Forwarding to `{}`", destination);
            }
            None => {
                info!(service = %group.service, "Forwarding to `{}`", destination);
            }
        }

        let mut outbound = self
            .client
            .request(parts.method, url)
            .headers(headers);
        if body.size_hint().exact() != Some(0) {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = match outbound.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = AppError::from_backend(group.service.as_str(), e);
                let outcome = match &err {
                    AppError::BackendTimeout { .. } => "timeout",
                    _ => "unreachable",
                };
                counter!("gateway_forwarded_requests_total", "service" => group.service.as_str(), "outcome" => outcome)
                    .increment(1);
                return Err(err);
            }
        };

        counter!("gateway_forwarded_requests_total", "service" => group.service.as_str(), "outcome" => "ok")
            .increment(1);

        Ok(into_response(upstream))
    }
}

/// Copy of the inbound headers fit for the backend: no hop-by-hop headers,
/// no `Host`, no client-supplied identity, caller appended to `X-Forwarded-For`.
fn outbound_headers(inbound: &HeaderMap, client_addr: Option<SocketAddr>) -> HeaderMap {
    let mut headers = strip_hop_by_hop(inbound);
    headers.remove(header::HOST);
    headers.remove(X_USER_ID);

    if let Some(addr) = client_addr {
        let ip = addr.ip().to_string();
        let forwarded = match inbound
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
        {
            Some(prior) => format!("{}, {}", prior, ip),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    headers
}

fn strip_hop_by_hop(source: &HeaderMap) -> HeaderMap {
    // Headers named by `Connection` are hop-by-hop too
    let named: Vec<String> = source
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source.iter() {
        let name_str = name.as_str();
        if HOP_BY_HOP.contains(&name_str) || named.iter().any(|n| n == name_str) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn into_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = strip_hop_by_hop(upstream.headers());

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_backend_target_from_url() {
        let target = BackendTarget::from_url("http://payment-service:3001").unwrap();
        assert_eq!(target.scheme, "http");
        assert_eq!(target.host, "payment-service:3001");

        let target = BackendTarget::from_url("https://users.internal/ignored/base").unwrap();
        assert_eq!(target.scheme, "https");
        assert_eq!(target.host, "users.internal");
    }

    #[test]
    fn test_backend_target_default_port_is_dropped() {
        let target = BackendTarget::from_url("https://users.internal:443").unwrap();
        assert_eq!(target.host, "users.internal");
    }

    #[test]
    fn test_backend_target_rejects_bad_urls() {
        assert!(BackendTarget::from_url("not a url").is_err());
        assert!(BackendTarget::from_url("ftp://files.internal").is_err());
        assert!(BackendTarget::from_url("").is_err());
    }

    #[test]
    fn test_url_for_keeps_query() {
        let target = BackendTarget::from_url("http://127.0.0.1:9000").unwrap();
        assert_eq!(
            target.url_for("/api/v1/payments/deposit", None),
            "http://127.0.0.1:9000/api/v1/payments/deposit"
        );
        assert_eq!(
            target.url_for("/api/v1/user", Some("ref=abc&x=1")),
            "http://127.0.0.1:9000/api/v1/user?ref=abc&x=1"
        );
    }

    #[test]
    fn test_service_group_uses_its_own_table() {
        let group = ServiceGroup::new(ServiceId::Payment, "http://localhost:3001").unwrap();
        assert_eq!(group.service, ServiceId::Payment);
        assert_eq!(
            group.routes.resolve("/payments/cancel"),
            "/api/v1/payments/cancel"
        );
    }

    #[test]
    fn test_outbound_headers_strip_hop_by_hop_and_identity() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, "gateway.example".parse().unwrap());
        inbound.insert(header::CONNECTION, "keep-alive, x-trace-hop".parse().unwrap());
        inbound.insert("keep-alive", "timeout=5".parse().unwrap());
        inbound.insert("x-trace-hop", "1".parse().unwrap());
        inbound.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        inbound.insert(X_USER_ID, "999".parse().unwrap());
        inbound.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        inbound.insert(header::COOKIE, "authorization=abc".parse().unwrap());

        let headers = outbound_headers(&inbound, None);

        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get("x-trace-hop").is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert!(headers.get(X_USER_ID).is_none());
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get(header::COOKIE).unwrap(), "authorization=abc");
    }

    #[test]
    fn test_outbound_headers_append_forwarded_for() {
        let addr: SocketAddr = "10.1.2.3:5555".parse().unwrap();

        let headers = outbound_headers(&HeaderMap::new(), Some(addr));
        assert_eq!(headers.get(X_FORWARDED_FOR).unwrap(), "10.1.2.3");

        let mut inbound = HeaderMap::new();
        inbound.insert(X_FORWARDED_FOR, "203.0.113.7".parse().unwrap());
        let headers = outbound_headers(&inbound, Some(addr));
        assert_eq!(
            headers.get(X_FORWARDED_FOR).unwrap(),
            "203.0.113.7, 10.1.2.3"
        );
    }

    #[test]
    fn test_repeated_headers_survive() {
        let mut inbound = HeaderMap::new();
        inbound.append("x-tag", "a".parse().unwrap());
        inbound.append("x-tag", "b".parse().unwrap());

        let headers = strip_hop_by_hop(&inbound);
        let values: Vec<_> = headers.get_all("x-tag").iter().collect();
        assert_eq!(values.len(), 2);
    }

    #[tokio::test]
    async fn test_identity_route_without_claims_is_unauthorized() {
        let forwarder = Forwarder::new(&ProxyConfig::default()).unwrap();
        let group = ServiceGroup::new(ServiceId::Payment, "http://127.0.0.1:1").unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/payments/deposit")
            .body(Body::empty())
            .unwrap();

        let err = forwarder
            .forward_with_identity(request, &group)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IdentityMissing));
    }

    #[tokio::test]
    async fn test_identity_route_with_unsupported_claim_is_internal_error() {
        use crate::jwt::UserIdClaim;

        let forwarder = Forwarder::new(&ProxyConfig::default()).unwrap();
        let group = ServiceGroup::new(ServiceId::Payment, "http://127.0.0.1:1").unwrap();

        let mut request = Request::builder()
            .method("POST")
            .uri("/payments/withdraw")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ClaimSet {
            exp: f64::MAX,
            user_id: Some(UserIdClaim::Unsupported("object")),
        });

        let err = forwarder
            .forward_with_identity(request, &group)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IdentityMalformed(_)));
    }
}
