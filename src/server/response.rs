//! Response construction helpers and the JSON envelope

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use hyper::{HeaderMap, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::IpAddr;
use tracing::{error, warn};

use crate::types::{GatewayError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Per-request facts every handler needs
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client_ip: IpAddr,
    pub method: Method,
    pub path: String,
    pub dev_mode: bool,
}

/// Facts a handler learned that the access log should record
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    pub user_id: Option<String>,
    pub service: Option<String>,
}

/// Attach access-log metadata to a response
pub fn with_meta(mut response: Response<Full<Bytes>>, meta: ResponseMeta) -> Response<Full<Bytes>> {
    response.extensions_mut().insert(meta);
    response
}

/// Convert a Full<Bytes> body to BoxBody
pub fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// Serialize `value` as a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = match serde_json::to_vec(value) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Failed to serialize response body");
            let mut response = Response::new(Full::new(Bytes::from_static(
                br#"{"success":false,"error":"Internal server error","code":"INTERNAL_ERROR"}"#,
            )));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            return response;
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Success envelope: `fields` plus `success: true` and a timestamp
pub fn success_response(status: StatusCode, fields: serde_json::Value) -> Response<Full<Bytes>> {
    let mut body = match fields {
        serde_json::Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    body.insert("success".to_string(), serde_json::Value::Bool(true));
    body.insert("timestamp".to_string(), now_rfc3339().into());
    json_response(status, &body)
}

/// Error envelope
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: &'static str,
    pub code: &'static str,
    pub message: String,
    pub timestamp: String,
    pub path: String,
    pub method: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(ctx: &RequestContext, err: &GatewayError) -> Self {
        Self {
            success: false,
            error: err.title(),
            code: err.code(),
            message: err.public_message(),
            timestamp: now_rfc3339(),
            path: ctx.path.clone(),
            method: ctx.method.to_string(),
            request_id: ctx.request_id.clone(),
            reason: err.reason(),
            service: err.service().map(str::to_string),
            retry_after: err.retry_after(),
            debug: if ctx.dev_mode { err.debug_detail() } else { None },
        }
    }
}

/// Map an error onto its status and envelope, logging server-side faults
pub fn error_response(ctx: &RequestContext, err: &GatewayError) -> Response<Full<Bytes>> {
    if err.is_server_fault() {
        error!(request_id = %ctx.request_id, path = %ctx.path, error = %err, "Request failed");
    } else {
        warn!(request_id = %ctx.request_id, path = %ctx.path, code = err.code(), "Request rejected");
    }

    let mut response = json_response(err.status_code(), &ErrorEnvelope::new(ctx, err));
    if let Some(secs) = err.retry_after() {
        response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

/// Collect a request body, failing with 413 past `limit` bytes
pub async fn read_body<B>(body: B, limit: usize) -> Result<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(GatewayError::PayloadTooLarge { limit })
        }
        Err(e) => Err(GatewayError::Validation(format!(
            "Failed to read request body: {e}"
        ))),
    }
}

/// Parse a JSON request body
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.is_empty() {
        return Err(GatewayError::Validation("Request body is required".into()));
    }
    Ok(serde_json::from_slice(body)?)
}

/// Get the Authorization header value
pub fn auth_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthRejection;
    use std::net::Ipv4Addr;

    fn ctx(dev_mode: bool) -> RequestContext {
        RequestContext {
            request_id: "req-42".into(),
            client_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            method: Method::GET,
            path: "/api/v1/users".into(),
            dev_mode,
        }
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_envelope_fields() {
        let err = GatewayError::Unauthorized(AuthRejection::Expired);
        let response = error_response(&ctx(false), &err);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "UNAUTHORIZED");
        assert_eq!(json["reason"], "expired");
        assert_eq!(json["path"], "/api/v1/users");
        assert_eq!(json["requestId"], "req-42");
        assert!(json.get("debug").is_none());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_debug_only_in_dev_mode() {
        let err = GatewayError::Storage("disk on fire".into());

        let json = body_json(error_response(&ctx(false), &err)).await;
        assert!(json.get("debug").is_none());
        assert!(!json["message"].as_str().unwrap().contains("fire"));

        let json = body_json(error_response(&ctx(true), &err)).await;
        assert_eq!(json["debug"], "disk on fire");
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let err = GatewayError::RateLimited {
            retry_after_secs: 42,
        };
        let response = error_response(&ctx(false), &err);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "42");
        assert_eq!(body_json(response).await["retryAfter"], 42);
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let json = body_json(success_response(
            StatusCode::CREATED,
            serde_json::json!({"message": "ok"}),
        ))
        .await;
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "ok");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_read_body_limit() {
        let body = Full::new(Bytes::from(vec![b'x'; 64]));
        let err = read_body(body, 16).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let body = Full::new(Bytes::from_static(b"{}"));
        assert_eq!(read_body(body, 16).await.unwrap(), Bytes::from_static(b"{}"));
    }

    #[test]
    fn test_parse_json_errors_are_validation() {
        let err = parse_json::<serde_json::Value>(b"").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        let err = parse_json::<serde_json::Value>(b"{oops").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
