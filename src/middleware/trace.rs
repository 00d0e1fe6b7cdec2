//! Custom TraceLayer span maker for proxied traffic.
//!
//! Payment requests can carry account data in the query string and the
//! credential in a cookie, so the span records the method and path only.

use axum::http::Request;
use axum_extra::extract::CookieJar;
use tower_http::trace::MakeSpan;
use tracing::Span;

use crate::jwt::CREDENTIAL_COOKIE;

/// A `MakeSpan` implementation that never records query strings or cookies.
#[derive(Clone, Debug)]
pub struct RedactedMakeSpan;

impl<B> MakeSpan<B> for RedactedMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            has_query = request.uri().query().is_some(),
            has_credential = has_credential_cookie(request),
            version = ?request.version(),
        )
    }
}

/// Whether the credential cookie is present. The value is never recorded.
fn has_credential_cookie<B>(request: &Request<B>) -> bool {
    CookieJar::from_headers(request.headers())
        .get(CREDENTIAL_COOKIE)
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn request_with_cookie(cookie: &str) -> Request<()> {
        Request::builder()
            .uri("/payments/deposit?account=123")
            .header(header::COOKIE, cookie)
            .body(())
            .unwrap()
    }

    #[test]
    fn test_detects_credential_cookie() {
        assert!(has_credential_cookie(&request_with_cookie(
            "authorization=eyJhbGciOiJIUzI1NiJ9.e30.sig"
        )));
        assert!(has_credential_cookie(&request_with_cookie(
            "theme=dark; authorization=abc"
        )));
    }

    #[test]
    fn test_ignores_other_cookies() {
        assert!(!has_credential_cookie(&request_with_cookie("theme=dark")));
        assert!(!has_credential_cookie(&request_with_cookie(
            "x-authorization=abc"
        )));
    }

    #[test]
    fn test_credential_in_second_cookie_header() {
        let request = Request::builder()
            .uri("/payments/withdraw")
            .header(header::COOKIE, "theme=dark")
            .header(header::COOKIE, "authorization=abc")
            .body(())
            .unwrap();
        assert!(has_credential_cookie(&request));
    }

    #[test]
    fn test_no_cookie_header() {
        let request = Request::builder().uri("/user").body(()).unwrap();
        assert!(!has_credential_cookie(&request));
    }
}
