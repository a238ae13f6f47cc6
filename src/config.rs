//! Configuration for the gateway
//!
//! CLI arguments and environment variable handling using clap. The parsed
//! [`Args`] is the single configuration snapshot for the process: it is built
//! once at startup and handed to every component constructor.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::logging::LogFormat;
use crate::proxy::BackendTarget;

/// Secret used when running with `--dev-mode` and no `JWT_SECRET`.
pub const DEV_JWT_SECRET: &str = "dev-only-insecure-secret-never-deploy-this-value";

/// Minimum length accepted for a production signing secret.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Longest token lifetime accepted: one year.
pub const MAX_JWT_EXPIRY_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Paramita Gateway - API gateway for the Six Perfections assessment platform
#[derive(Parser, Debug, Clone)]
#[command(name = "paramita-gateway")]
#[command(about = "API gateway for the Six Perfections assessment platform")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Enable development mode (dev signing secret, debug fields in error bodies)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Root directory for JSON data files
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Directory holding one JSON file per user (defaults to DATA_DIR/users)
    #[arg(long, env = "USER_DATA_PATH")]
    pub user_data_path: Option<PathBuf>,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds (default 7 days)
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "604800")]
    pub jwt_expiry_seconds: u64,

    /// Issuer claim written into and required on every token
    #[arg(long, env = "JWT_ISSUER", default_value = "six-perfections-json")]
    pub jwt_issuer: String,

    /// Audience claim written into and required on every token
    #[arg(long, env = "JWT_AUDIENCE", default_value = "six-perfections-app")]
    pub jwt_audience: String,

    /// Backend service locations
    #[command(flatten)]
    pub services: ServiceArgs,

    /// Timeout for each backend health probe in milliseconds
    #[arg(long, env = "HEALTH_PROBE_TIMEOUT_MS", default_value = "3000")]
    pub health_probe_timeout_ms: u64,

    /// Comma-separated list of allowed CORS origins ("*" allows any)
    #[arg(
        long,
        env = "CORS_ALLOWED_ORIGINS",
        default_value = "http://localhost:3001,http://localhost:3002,http://localhost:8001"
    )]
    pub cors_allowed_origins: String,

    /// Rate limit window in milliseconds (default 15 minutes)
    #[arg(long, env = "RATE_LIMIT_WINDOW_MS", default_value = "900000")]
    pub rate_limit_window_ms: u64,

    /// Maximum requests per client IP within one window
    #[arg(long, env = "RATE_LIMIT_MAX", default_value = "100")]
    pub rate_limit_max: u32,

    /// Maximum accepted request body size in bytes (default 10 MiB)
    #[arg(long, env = "MAX_REQUEST_BYTES", default_value = "10485760")]
    pub max_request_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Base URL and timeout for each backend service
#[derive(Parser, Debug, Clone)]
pub struct ServiceArgs {
    #[arg(long, env = "AUTH_SERVICE_URL", default_value = "http://localhost:8001")]
    pub auth_service_url: String,

    #[arg(long, env = "AUTH_SERVICE_TIMEOUT_MS", default_value = "5000")]
    pub auth_service_timeout_ms: u64,

    #[arg(long, env = "ASSESSMENT_SERVICE_URL", default_value = "http://localhost:8002")]
    pub assessment_service_url: String,

    #[arg(long, env = "ASSESSMENT_SERVICE_TIMEOUT_MS", default_value = "10000")]
    pub assessment_service_timeout_ms: u64,

    #[arg(long, env = "USER_SERVICE_URL", default_value = "http://localhost:8003")]
    pub user_service_url: String,

    #[arg(long, env = "USER_SERVICE_TIMEOUT_MS", default_value = "5000")]
    pub user_service_timeout_ms: u64,

    #[arg(long, env = "CONTENT_SERVICE_URL", default_value = "http://localhost:8004")]
    pub content_service_url: String,

    #[arg(long, env = "CONTENT_SERVICE_TIMEOUT_MS", default_value = "5000")]
    pub content_service_timeout_ms: u64,

    #[arg(long, env = "ANALYTICS_SERVICE_URL", default_value = "http://localhost:8005")]
    pub analytics_service_url: String,

    #[arg(long, env = "ANALYTICS_SERVICE_TIMEOUT_MS", default_value = "10000")]
    pub analytics_service_timeout_ms: u64,

    #[arg(long, env = "NOTIFICATION_SERVICE_URL", default_value = "http://localhost:8006")]
    pub notification_service_url: String,

    #[arg(long, env = "NOTIFICATION_SERVICE_TIMEOUT_MS", default_value = "5000")]
    pub notification_service_timeout_ms: u64,
}

impl ServiceArgs {
    /// All configured backends, in a stable order
    pub fn targets(&self) -> Vec<BackendTarget> {
        vec![
            BackendTarget::new("auth", &self.auth_service_url, self.auth_service_timeout_ms),
            BackendTarget::new(
                "assessment",
                &self.assessment_service_url,
                self.assessment_service_timeout_ms,
            ),
            BackendTarget::new("user", &self.user_service_url, self.user_service_timeout_ms),
            BackendTarget::new(
                "content",
                &self.content_service_url,
                self.content_service_timeout_ms,
            ),
            BackendTarget::new(
                "analytics",
                &self.analytics_service_url,
                self.analytics_service_timeout_ms,
            ),
            BackendTarget::new(
                "notification",
                &self.notification_service_url,
                self.notification_service_timeout_ms,
            ),
        ]
    }
}

impl Args {
    /// Directory holding user records
    pub fn user_data_dir(&self) -> PathBuf {
        self.user_data_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("users"))
    }

    /// Effective JWT secret. Only development mode falls back to a built-in value.
    pub fn jwt_secret(&self) -> Option<String> {
        match &self.jwt_secret {
            Some(secret) if !secret.is_empty() => Some(secret.clone()),
            _ if self.dev_mode => Some(DEV_JWT_SECRET.to_string()),
            _ => None,
        }
    }

    /// Environment label reported by /api/v1/version and /health
    pub fn environment(&self) -> &'static str {
        if self.dev_mode {
            "development"
        } else {
            "production"
        }
    }

    /// Parsed CORS allow-list
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn health_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.health_probe_timeout_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match self.jwt_secret.as_deref() {
                None | Some("") => {
                    return Err("JWT_SECRET is required in production mode".to_string());
                }
                Some(secret) if secret.len() < MIN_JWT_SECRET_LEN => {
                    return Err(format!(
                        "JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters"
                    ));
                }
                _ => {}
            }
        }

        if self.jwt_expiry_seconds == 0 {
            return Err("JWT_EXPIRY_SECONDS must be greater than zero".to_string());
        }
        if self.jwt_expiry_seconds > MAX_JWT_EXPIRY_SECONDS {
            return Err(format!(
                "JWT_EXPIRY_SECONDS must be at most {MAX_JWT_EXPIRY_SECONDS}"
            ));
        }

        if self.rate_limit_max == 0 || self.rate_limit_window_ms == 0 {
            return Err("RATE_LIMIT_MAX and RATE_LIMIT_WINDOW_MS must be non-zero".to_string());
        }

        for target in self.services.targets() {
            if !target.base_url.starts_with("http://") && !target.base_url.starts_with("https://")
            {
                return Err(format!(
                    "{} service URL must start with http:// or https:// (got {})",
                    target.name, target.base_url
                ));
            }
        }

        Ok(())
    }
}
