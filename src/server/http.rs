//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Every request passes the
//! same pipeline: request id, rate limit (for non-preflight `/api/*`), body size limit,
//! routing, then CORS and security headers and one access-log event.

use bytes::Bytes;
use futures::FutureExt;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, ORIGIN, VARY};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::response::{
    error_response, read_body, to_boxed, BoxBody, RequestContext, ResponseMeta,
};
use crate::auth::{AuthGate, TokenService};
use crate::config::Args;
use crate::logging::AccessEvent;
use crate::proxy::{Dispatcher, RouteTable};
use crate::routes;
use crate::services::{self, HealthAggregator, RateDecision, RateLimiter};
use crate::store::UserStore;
use crate::types::{GatewayError, Result};

const X_REQUEST_ID: &str = "x-request-id";

/// How often idle rate-limit entries are pruned
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub tokens: Arc<TokenService>,
    pub store: Arc<UserStore>,
    pub gate: AuthGate,
    pub routes: RouteTable,
    pub dispatcher: Dispatcher,
    pub health: HealthAggregator,
    pub rate_limiter: Arc<RateLimiter>,
    pub cors_origins: Vec<String>,
    pub started_at: Instant,
}

impl AppState {
    /// Build every component from one configuration snapshot
    pub fn new(args: Args) -> Result<Self> {
        let secret = args.jwt_secret().ok_or_else(|| {
            GatewayError::Config("JWT_SECRET is required in production mode".into())
        })?;
        let tokens = Arc::new(TokenService::new(
            &secret,
            Duration::from_secs(args.jwt_expiry_seconds),
            args.jwt_issuer.clone(),
            args.jwt_audience.clone(),
        )?);

        let store = Arc::new(UserStore::new(args.user_data_dir()));
        let gate = AuthGate::new(Arc::clone(&tokens), Arc::clone(&store));

        let targets = args.services.targets();
        let dispatcher = Dispatcher::new(targets.clone())?;
        let health = HealthAggregator::new(targets, args.health_probe_timeout())?;

        let rate_limiter = Arc::new(RateLimiter::new(
            args.rate_limit_window(),
            args.rate_limit_max,
        ));

        Ok(Self {
            cors_origins: args.cors_origins(),
            tokens,
            store,
            gate,
            routes: RouteTable::standard(),
            dispatcher,
            health,
            rate_limiter,
            started_at: Instant::now(),
            args,
        })
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.cors_origins.iter().any(|o| o == "*" || o == origin)
    }
}

/// Run the HTTP server until the listener fails
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen)
        .await
        .map_err(|e| GatewayError::Config(format!("Failed to bind {}: {e}", state.args.listen)))?;

    info!("Paramita gateway listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - dev signing secret and debug error details in use");
    }

    services::spawn_cleanup_task(Arc::clone(&state.rate_limiter), RATE_LIMIT_CLEANUP_INTERVAL);
    info!(
        "Rate limit: {} requests per {}s per client on /api/*",
        state.args.rate_limit_max,
        state.args.rate_limit_window().as_secs()
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, Infallible>(handle_request(state, addr, req).await) }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Handle one request end to end. Never fails; every error becomes an envelope.
pub async fn handle_request<B>(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<B>,
) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let (parts, body) = req.into_parts();

    let ctx = RequestContext {
        request_id: request_id_for(&parts.headers),
        client_ip: addr.ip(),
        method: parts.method.clone(),
        path: parts.uri.path().to_string(),
        dev_mode: state.args.dev_mode,
    };
    let origin = parts
        .headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let rate = if ctx.path.starts_with("/api/") && ctx.method != Method::OPTIONS {
        Some(state.rate_limiter.check_and_record(ctx.client_ip))
    } else {
        None
    };

    let mut response = match rate {
        Some(RateDecision::Limited {
            retry_after_secs, ..
        }) => error_response(&ctx, &GatewayError::RateLimited { retry_after_secs }),
        _ if ctx.method == Method::OPTIONS => preflight_response(&state, &ctx, origin.as_deref()),
        _ => match read_body(body, state.args.max_request_bytes).await {
            Err(e) => error_response(&ctx, &e),
            Ok(bytes) => {
                let req = Request::from_parts(parts, bytes);
                AssertUnwindSafe(route(Arc::clone(&state), &ctx, req))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let detail = panic_message(&*panic);
                        error!(request_id = %ctx.request_id, panic = %detail, "Request handler panicked");
                        error_response(&ctx, &GatewayError::Internal(detail))
                    })
            }
        },
    };

    let headers = response.headers_mut();
    if let Some(decision) = rate {
        apply_rate_headers(headers, decision);
    }
    apply_cors_headers(&state, headers, origin.as_deref());
    apply_security_headers(headers);
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        headers.insert(X_REQUEST_ID, value);
    }

    let meta = response
        .extensions()
        .get::<ResponseMeta>()
        .cloned()
        .unwrap_or_default();
    AccessEvent::new(ctx.method.as_str(), &ctx.path, ctx.client_ip, &ctx.request_id)
        .with_status(response.status().as_u16())
        .with_duration(started.elapsed())
        .with_user(meta.user_id)
        .with_service(meta.service)
        .emit();

    to_boxed(response)
}

/// Dispatch on method and path
async fn route(
    state: Arc<AppState>,
    ctx: &RequestContext,
    req: Request<Bytes>,
) -> Response<Full<Bytes>> {
    let result = match (ctx.method.clone(), ctx.path.as_str()) {
        (Method::GET, "/health") => Ok(routes::health_check(&state).await),
        (Method::GET, "/paramitas") => Ok(routes::paramitas_info()),
        (Method::GET, "/api/v1/version") => Ok(routes::version_info(&state)),
        (Method::GET, "/api/v1/health/services") => Ok(routes::services_health(&state).await),
        (_, "/functions/auth") => routes::handle_auth_function(&state, ctx, req).await,
        (Method::GET, "/functions/health") => Ok(routes::storage_health(&state).await),
        (_, path) if path.starts_with("/api/") => {
            routes::handle_api_request(&state, ctx, req).await
        }
        _ => Err(not_found(ctx)),
    };

    result.unwrap_or_else(|e| error_response(ctx, &e))
}

pub fn not_found(ctx: &RequestContext) -> GatewayError {
    GatewayError::NotFound(format!("Route {} {} not found", ctx.method, ctx.path))
}

/// Reuse a sane caller-supplied request id, otherwise mint one
fn request_id_for(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| {
            !id.is_empty()
                && id.len() <= 128
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        })
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn preflight_response(
    state: &AppState,
    ctx: &RequestContext,
    origin: Option<&str>,
) -> Response<Full<Bytes>> {
    match origin {
        Some(origin) if !state.origin_allowed(origin) => {
            debug!(origin = %origin, "CORS preflight from disallowed origin");
            error_response(
                ctx,
                &GatewayError::Forbidden("Origin not allowed by CORS policy".into()),
            )
        }
        _ => {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::NO_CONTENT;
            let headers = response.headers_mut();
            headers.insert(
                "access-control-allow-methods",
                HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
            );
            headers.insert(
                "access-control-allow-headers",
                HeaderValue::from_static("Content-Type, Authorization, X-Request-ID"),
            );
            headers.insert("access-control-max-age", HeaderValue::from_static("86400"));
            response
        }
    }
}

fn apply_cors_headers(state: &AppState, headers: &mut HeaderMap, origin: Option<&str>) {
    let Some(origin) = origin else {
        return;
    };
    headers.append(VARY, HeaderValue::from_static("Origin"));
    if !state.origin_allowed(origin) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert("access-control-allow-origin", value);
        headers.insert(
            "access-control-allow-credentials",
            HeaderValue::from_static("true"),
        );
        headers.insert(
            "access-control-expose-headers",
            HeaderValue::from_static("X-Request-ID, RateLimit-Limit, RateLimit-Remaining, Retry-After"),
        );
    }
}

fn apply_rate_headers(headers: &mut HeaderMap, decision: RateDecision) {
    let (limit, remaining) = match decision {
        RateDecision::Allowed { limit, remaining } => (limit, remaining),
        RateDecision::Limited { limit, .. } => (limit, 0),
    };
    headers.insert(HeaderName::from_static("ratelimit-limit"), HeaderValue::from(limit));
    headers.insert(
        HeaderName::from_static("ratelimit-remaining"),
        HeaderValue::from(remaining),
    );
}

fn apply_security_headers(headers: &mut HeaderMap) {
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("SAMEORIGIN"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=15552000; includeSubDomains"),
    );
    headers.insert("x-dns-prefetch-control", HeaderValue::from_static("off"));
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "request handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_reuse_and_minting() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));
        assert_eq!(request_id_for(&headers), "abc-123");

        headers.insert(X_REQUEST_ID, HeaderValue::from_static("bad id with spaces"));
        let minted = request_id_for(&headers);
        assert_ne!(minted, "bad id with spaces");
        assert!(uuid::Uuid::parse_str(&minted).is_ok());

        assert!(uuid::Uuid::parse_str(&request_id_for(&HeaderMap::new())).is_ok());
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&7u8), "request handler panicked");
    }
}
