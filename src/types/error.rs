//! Error types for the gateway
//!
//! Every component returns its own typed error; all of them convert into
//! [`GatewayError`], which the HTTP layer maps onto status, code and envelope.

use hyper::StatusCode;

use crate::auth::{AuthRejection, TokenError};
use crate::proxy::DispatchError;
use crate::store::StoreError;

/// Main error type for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(AuthRejection),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Insufficient permissions: role '{required}' required")]
    InsufficientPermissions { required: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large (limit {limit} bytes)")]
    PayloadTooLarge { limit: usize },

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Service '{service}' unavailable: {detail}")]
    ServiceUnavailable { service: String, detail: String },

    #[error("Service '{service}' timed out")]
    GatewayTimeout { service: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InsufficientPermissions { .. } => "INSUFFICIENT_PERMISSIONS",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::GatewayTimeout { .. } => "GATEWAY_TIMEOUT",
            Self::Storage(_) | Self::Config(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Short human-readable title, the `error` field of the envelope
    pub fn title(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation error",
            Self::Unauthorized(_) => "Unauthorized",
            Self::InvalidCredentials(_) => "Invalid credentials",
            Self::Forbidden(_) => "Forbidden",
            Self::InsufficientPermissions { .. } => "Insufficient permissions",
            Self::NotFound(_) => "Not found",
            Self::Conflict(_) => "Conflict",
            Self::PayloadTooLarge { .. } => "Payload too large",
            Self::RateLimited { .. } => "Too many requests",
            Self::ServiceUnavailable { .. } => "Service unavailable",
            Self::GatewayTimeout { .. } => "Gateway timeout",
            Self::Storage(_) | Self::Config(_) | Self::Internal(_) => "Internal server error",
        }
    }

    /// Message safe to show to any caller. Internal detail never appears here.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg)
            | Self::InvalidCredentials(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg) => msg.clone(),
            Self::Unauthorized(rejection) => rejection.message().to_string(),
            Self::InsufficientPermissions { required } => {
                format!("This resource requires the '{required}' role")
            }
            Self::PayloadTooLarge { limit } => {
                format!("Request body exceeds the {limit} byte limit")
            }
            Self::RateLimited { .. } => {
                "Too many requests from this IP, please try again later".to_string()
            }
            Self::ServiceUnavailable { service, .. } => {
                format!("The {service} service is temporarily unavailable")
            }
            Self::GatewayTimeout { service } => {
                format!("The {service} service did not respond in time")
            }
            Self::Storage(_) | Self::Config(_) | Self::Internal(_) => {
                "An unexpected error occurred".to_string()
            }
        }
    }

    /// Detail that is only exposed in development mode
    pub fn debug_detail(&self) -> Option<String> {
        match self {
            Self::Storage(detail) | Self::Config(detail) | Self::Internal(detail) => {
                Some(detail.clone())
            }
            Self::ServiceUnavailable { detail, .. } => Some(detail.clone()),
            _ => None,
        }
    }

    /// Auth rejection reason, if this is a 401 from the auth gate
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Unauthorized(rejection) => Some(rejection.reason()),
            _ => None,
        }
    }

    /// Backend service this error concerns, if any
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::ServiceUnavailable { service, .. } | Self::GatewayTimeout { service } => {
                Some(service)
            }
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Whether this error reflects a fault on our side rather than the caller's
    pub fn is_server_fault(&self) -> bool {
        self.status_code().is_server_error()
    }
}

// Implement From conversions for component error types

impl From<AuthRejection> for GatewayError {
    fn from(rejection: AuthRejection) -> Self {
        Self::Unauthorized(rejection)
    }
}

impl From<TokenError> for GatewayError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::Unauthorized(AuthRejection::Expired),
            TokenError::Malformed(_) => Self::Unauthorized(AuthRejection::Malformed),
            TokenError::Signing(msg) => Self::Internal(format!("Token signing failed: {msg}")),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail(_) => Self::Conflict("User already exists".into()),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<DispatchError> for GatewayError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::UnknownService(service) => Self::ServiceUnavailable {
                detail: format!("no backend configured for '{service}'"),
                service,
            },
            DispatchError::Unreachable { service, detail } => {
                Self::ServiceUnavailable { service, detail }
            }
            DispatchError::BodyTimeout { service } => Self::GatewayTimeout { service },
            DispatchError::BodyRead { service, detail } => {
                Self::ServiceUnavailable { service, detail }
            }
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("Invalid JSON body: {}", err))
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
