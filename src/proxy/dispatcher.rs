//! Forwarding requests to backend services
//!
//! The outbound leg drops hop-by-hop headers, `Host` and any caller-supplied
//! identity headers, then adds tracing headers and, for authenticated routes,
//! the verified identity. The inbound leg is tagged with the serving gateway
//! and the backend name.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Response};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::types::GatewayError;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_GATEWAY_VERSION: &str = "x-gateway-version";
pub const X_USER_ID: &str = "x-user-id";
pub const X_USER_EMAIL: &str = "x-user-email";
pub const X_USER_LEVEL: &str = "x-user-level";
pub const X_SERVED_BY: &str = "x-served-by";
pub const X_SERVICE: &str = "x-service";

/// Value of `X-Served-By` on proxied responses
pub const SERVED_BY: &str = "paramita-gateway";

/// Headers that only describe a single connection
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers only the gateway may set on the outbound leg
const GATEWAY_OWNED: &[&str] = &[
    "host",
    "content-length",
    X_REQUEST_ID,
    X_FORWARDED_FOR,
    X_GATEWAY_VERSION,
    X_USER_ID,
    X_USER_EMAIL,
    X_USER_LEVEL,
];

/// A backend service location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub name: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl BackendTarget {
    pub fn new(name: &str, base_url: &str, timeout_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        }
    }
}

/// Verified caller identity passed to backends
#[derive(Debug, Clone)]
pub struct ForwardedIdentity {
    pub user_id: String,
    pub email: String,
    pub level: String,
}

/// Everything needed to forward one request
#[derive(Debug)]
pub struct ForwardRequest {
    pub method: Method,
    pub upstream_path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub request_id: String,
    pub client_ip: IpAddr,
    pub identity: Option<ForwardedIdentity>,
}

/// Forwarding failures
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no backend configured for service '{0}'")]
    UnknownService(String),

    /// Connect, DNS or timeout before response headers arrived
    #[error("service '{service}' unreachable: {detail}")]
    Unreachable { service: String, detail: String },

    #[error("service '{service}' timed out while sending its response body")]
    BodyTimeout { service: String },

    #[error("service '{service}' response body failed: {detail}")]
    BodyRead { service: String, detail: String },
}

/// Reverse proxy over the configured backends
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    targets: HashMap<String, BackendTarget>,
    gateway_version: HeaderValue,
}

impl Dispatcher {
    pub fn new(targets: Vec<BackendTarget>) -> Result<Self, GatewayError> {
        // backends are addressed directly, never through a system proxy
        let client = reqwest::Client::builder()
            .no_proxy()
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            targets: targets.into_iter().map(|t| (t.name.clone(), t)).collect(),
            gateway_version: HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn target(&self, service: &str) -> Option<&BackendTarget> {
        self.targets.get(service)
    }

    /// Forward `req` to `service` and return its response
    pub async fn forward(
        &self,
        service: &str,
        req: ForwardRequest,
    ) -> Result<Response<Full<Bytes>>, DispatchError> {
        let target = self
            .target(service)
            .ok_or_else(|| DispatchError::UnknownService(service.to_string()))?;

        let url = target.url_for(&req.upstream_path, req.query.as_deref());
        let headers = self.outbound_headers(&req);
        let started = Instant::now();

        info!(
            method = %req.method,
            service = %target.name,
            upstream_path = %req.upstream_path,
            request_id = %req.request_id,
            "Proxying request"
        );

        let mut builder = self
            .client
            .request(req.method.clone(), &url)
            .headers(headers)
            .timeout(target.timeout);
        if !req.body.is_empty() {
            builder = builder.body(req.body);
        }

        let upstream = builder.send().await.map_err(|e| {
            warn!(
                service = %target.name,
                url = %url,
                error = %e,
                timeout = e.is_timeout(),
                "Backend request failed"
            );
            DispatchError::Unreachable {
                service: target.name.clone(),
                detail: e.to_string(),
            }
        })?;

        let status = upstream.status();
        let upstream_headers = upstream.headers().clone();

        let body = upstream.bytes().await.map_err(|e| {
            warn!(service = %target.name, error = %e, "Failed reading backend response body");
            if e.is_timeout() {
                DispatchError::BodyTimeout {
                    service: target.name.clone(),
                }
            } else {
                DispatchError::BodyRead {
                    service: target.name.clone(),
                    detail: e.to_string(),
                }
            }
        })?;

        debug!(
            service = %target.name,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Backend responded"
        );

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        let out = response.headers_mut();
        for (name, value) in upstream_headers.iter() {
            if !is_hop_by_hop(name) && name.as_str() != "content-length" {
                out.append(name.clone(), value.clone());
            }
        }
        out.insert(X_SERVED_BY, HeaderValue::from_static(SERVED_BY));
        if let Ok(value) = HeaderValue::from_str(&target.name) {
            out.insert(X_SERVICE, value);
        }

        Ok(response)
    }

    fn outbound_headers(&self, req: &ForwardRequest) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(req.headers.len() + 6);
        for (name, value) in req.headers.iter() {
            if is_hop_by_hop(name) || GATEWAY_OWNED.contains(&name.as_str()) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        set_header(&mut headers, X_REQUEST_ID, &req.request_id);
        set_header(&mut headers, X_FORWARDED_FOR, &req.client_ip.to_string());
        headers.insert(X_GATEWAY_VERSION, self.gateway_version.clone());

        if let Some(identity) = &req.identity {
            set_header(&mut headers, X_USER_ID, &identity.user_id);
            set_header(&mut headers, X_USER_EMAIL, &identity.email);
            set_header(&mut headers, X_USER_LEVEL, &identity.level);
        }

        headers
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => debug!(header = name, "Dropping header with invalid value"),
    }
}
