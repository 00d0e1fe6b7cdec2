//! Credential verification
//!
//! Validates the HS256 token carried in the `authorization` cookie and
//! decodes its claims. Only HS256 is accepted and expiry is enforced with
//! zero leeway.

use axum::http::HeaderValue;
use chrono::Utc;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

use crate::config::JwtConfig;
use crate::error::{AppError, Result};

/// Cookie carrying the credential
pub const CREDENTIAL_COOKIE: &str = "authorization";

/// Decoded payload of a verified credential.
///
/// Lives in the request extensions of exactly one request.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimSet {
    /// Expiration in seconds since the epoch. Any JSON number is accepted,
    /// fractional ones included.
    pub exp: f64,
    /// Identity of the caller, as issued by the user service
    #[serde(default)]
    pub user_id: Option<UserIdClaim>,
}

/// The `user_id` claim, resolved once at decode time.
///
/// The user service has issued both numeric and string identifiers, so both
/// are accepted; every other JSON shape is kept as `Unsupported` and rejected
/// when the identity is actually needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdClaim {
    Numeric(i64),
    Text(String),
    /// JSON type of the unrepresentable value
    Unsupported(&'static str),
}

impl UserIdClaim {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return UserIdClaim::Numeric(i);
                }
                // Integral floats such as 42.0
                match n.as_f64() {
                    Some(f)
                        if f.is_finite()
                            && f.fract() == 0.0
                            && f >= i64::MIN as f64
                            && f < i64::MAX as f64 =>
                    {
                        UserIdClaim::Numeric(f as i64)
                    }
                    // Identities beyond i64 are refused rather than rounded
                    Some(f) if f.fract() == 0.0 => UserIdClaim::Unsupported("number out of range"),
                    _ => UserIdClaim::Unsupported("non-integral number"),
                }
            }
            Value::String(s) => UserIdClaim::Text(s),
            Value::Bool(_) => UserIdClaim::Unsupported("boolean"),
            Value::Array(_) => UserIdClaim::Unsupported("array"),
            Value::Object(_) => UserIdClaim::Unsupported("object"),
            Value::Null => UserIdClaim::Unsupported("null"),
        }
    }

    /// Canonical header form of the identity
    pub fn to_user_id(&self) -> Result<UserId> {
        match self {
            UserIdClaim::Numeric(id) => Ok(UserId(id.to_string())),
            UserIdClaim::Text(s) => {
                if s.is_empty() || HeaderValue::from_str(s).is_err() {
                    return Err(AppError::IdentityMalformed(
                        "string not usable as a header value".to_string(),
                    ));
                }
                Ok(UserId(s.clone()))
            }
            UserIdClaim::Unsupported(shape) => Err(AppError::IdentityMalformed(shape.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for UserIdClaim {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(UserIdClaim::from_value)
    }
}

/// Normalized caller identity, sent upstream as `X-User-Id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authentication errors
///
/// The variants only matter for logs; every one of them answers 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credential cookie present
    MissingToken,
    /// Signature, algorithm, format or claim-shape failure
    InvalidToken(String),
    /// Token has expired
    TokenExpired,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => f.write_str("missing credential"),
            AuthError::InvalidToken(reason) => write!(f, "invalid credential: {}", reason),
            AuthError::TokenExpired => f.write_str("credential expired"),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

/// Verifies credentials against the pre-shared secret
#[derive(Clone)]
pub struct ClaimVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl ClaimVerifier {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation: strict_validation(),
        }
    }

    /// Verify a raw credential and return its claims
    pub fn verify(&self, raw_credential: &str) -> std::result::Result<ClaimSet, AuthError> {
        self.verify_at(raw_credential, Utc::now().timestamp())
    }

    fn verify_at(
        &self,
        raw_credential: &str,
        now: i64,
    ) -> std::result::Result<ClaimSet, AuthError> {
        if raw_credential.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let token_data = decode::<ClaimSet>(raw_credential, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidToken("algorithm not allowed".to_string())
                }
                ErrorKind::InvalidSignature => {
                    AuthError::InvalidToken("bad signature".to_string())
                }
                other => AuthError::InvalidToken(format!("{:?}", other)),
            })?;

        // Expiry is checked here rather than by the library, which only
        // understands integral `exp`. A credential is dead once `now` reaches `exp`.
        if token_data.claims.exp <= now as f64 {
            return Err(AuthError::TokenExpired);
        }

        Ok(token_data.claims)
    }
}

/// HS256 only, no audience check. Presence and expiry of `exp` are
/// enforced by `ClaimSet` deserialization and `verify_at`.
fn strict_validation() -> Validation {
    let mut v = Validation::new(Algorithm::HS256);
    v.leeway = 0;
    v.validate_exp = false;
    v.validate_aud = false;
    v.required_spec_claims.clear();
    v
}
