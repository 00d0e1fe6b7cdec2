//! Configuration management for the API Gateway

use anyhow::{bail, Context, Result};
use std::env;

/// Origins of the deployed payment frontend, used when `CORS_ALLOWED_ORIGINS` is unset.
const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "https://localhost:5173",
    "https://payment-frontend-production.up.railway.app",
];

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Credential verification configuration
    pub jwt: JwtConfig,
    /// Backend service base URLs
    pub services: ServicesConfig,
    /// Backend client bounds
    pub proxy: ProxyConfig,
    /// Cross-origin policy
    pub cors: CorsConfig,
    /// File served verbatim at `GET /version`
    pub version_file: String,
}

#[derive(Clone)]
pub struct JwtConfig {
    /// Pre-shared HS256 secret
    pub secret: String,
    /// Cookie carrying the credential
    pub cookie_name: String,
}

// Never print the secret
impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("cookie_name", &self.cookie_name)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServicesConfig {
    /// User service base URL (e.g., http://user-service:3000)
    pub user_url: String,
    /// Payment service base URL (e.g., http://payment-service:3001)
    pub payment_url: String,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_age_secs: 12 * 60 * 60,
        }
    }
}

/// Logging configuration, read before the rest of the config so that
/// startup errors are already reported through the subscriber.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "json" or "pretty"
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            metrics_enabled: env_flag("METRICS_ENABLED"),
        }
    }
}

/// Load dotenv files layered by `APP_ENV` and return the resolved environment name.
///
/// Variables already set win over every file, and earlier files win over later ones:
/// `.env.{env}.local`, `.env.local` (not for `test`), `.env.{env}`, `.env`.
pub fn load_env_files() -> String {
    let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

    for file in env_file_chain(&app_env) {
        // Missing files are expected
        let _ = dotenvy::from_filename(&file);
    }

    app_env
}

fn env_file_chain(app_env: &str) -> Vec<String> {
    let mut files = vec![format!(".env.{}.local", app_env)];
    if app_env != "test" {
        files.push(".env.local".to_string());
    }
    files.push(format!(".env.{}", app_env));
    files.push(".env".to_string());
    files
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_host: env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: parse_port(&env::var("APP_PORT").unwrap_or_else(|_| "8080".to_string()))
                .context("Invalid APP_PORT")?,
            jwt: JwtConfig {
                secret: env::var("SECRET_KEY").context("SECRET_KEY is required")?,
                cookie_name: crate::jwt::CREDENTIAL_COOKIE.to_string(),
            },
            services: ServicesConfig {
                user_url: env::var("USER_SERVICE_HOST")
                    .context("USER_SERVICE_HOST is required")?,
                payment_url: env::var("PAYMENT_SERVICE_HOST")
                    .context("PAYMENT_SERVICE_HOST is required")?,
            },
            proxy: ProxyConfig {
                connect_timeout_secs: env::var("BACKEND_CONNECT_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("Invalid BACKEND_CONNECT_TIMEOUT_SECS")?,
                request_timeout_secs: env::var("BACKEND_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("Invalid BACKEND_TIMEOUT_SECS")?,
            },
            cors: CorsConfig {
                allowed_origins: match env::var("CORS_ALLOWED_ORIGINS") {
                    Ok(raw) => parse_origins(&raw).context("Invalid CORS_ALLOWED_ORIGINS")?,
                    Err(_) => CorsConfig::default().allowed_origins,
                },
                ..CorsConfig::default()
            },
            version_file: env::var("VERSION_FILE").unwrap_or_else(|_| "./version.txt".to_string()),
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

/// Accepts both `8080` and the listen-address form `:8080`.
fn parse_port(raw: &str) -> Result<u16> {
    let port = raw.trim().trim_start_matches(':');
    port.parse()
        .with_context(|| format!("'{}' is not a port number", raw))
}

/// Comma-separated explicit origins. Credentials are allowed, so `*` is refused.
fn parse_origins(raw: &str) -> Result<Vec<String>> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if origins.iter().any(|o| o == "*") {
        bail!("wildcard origin '*' cannot be combined with credentials");
    }
    Ok(origins)
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|s| s.to_lowercase() == "true")
        .unwrap_or(false)
}
