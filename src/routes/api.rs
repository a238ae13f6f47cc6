//! `/api/v1/*` proxy routes
//!
//! Resolve the route, run the auth gate and role check the route demands,
//! then forward. A role failure never reaches the backend, and neither does a
//! path with dot segments that the upstream URL parser would re-resolve.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response};
use tracing::debug;

use crate::auth::require_role;
use crate::proxy::{is_canonical_path, ForwardRequest, ForwardedIdentity};
use crate::server::response::{auth_header, with_meta, RequestContext, ResponseMeta};
use crate::server::{not_found, AppState};
use crate::types::{GatewayError, Result};

pub async fn handle_api_request(
    state: &AppState,
    ctx: &RequestContext,
    req: Request<Bytes>,
) -> Result<Response<Full<Bytes>>> {
    if !is_canonical_path(&ctx.path) {
        return Err(GatewayError::Validation(
            "Request path must not contain dot segments or encoded separators".into(),
        ));
    }

    let matched = state.routes.resolve(&ctx.path).ok_or_else(|| not_found(ctx))?;
    let route = matched.route;

    let identity = if route.access.requires_auth() {
        let identity = state.gate.authenticate(auth_header(req.headers())).await?;
        if let Some(role) = route.access.required_role() {
            require_role(&identity, role)?;
        }
        Some(identity)
    } else {
        None
    };

    debug!(
        request_id = %ctx.request_id,
        prefix = %route.prefix,
        service = %route.service,
        user_id = identity.as_ref().map(|i| i.user_id()).unwrap_or("-"),
        "Route resolved"
    );

    let (parts, body) = req.into_parts();
    let forwarded = identity.as_ref().map(|i| ForwardedIdentity {
        user_id: i.user.id.clone(),
        email: i.user.email.clone(),
        level: i.user.spiritual_level.clone(),
    });

    let forward = ForwardRequest {
        method: parts.method,
        upstream_path: matched.upstream_path,
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
        request_id: ctx.request_id.clone(),
        client_ip: ctx.client_ip,
        identity: forwarded,
    };

    let response = state.dispatcher.forward(&route.service, forward).await?;

    Ok(with_meta(
        response,
        ResponseMeta {
            user_id: identity.map(|i| i.user.id),
            service: Some(route.service.clone()),
        },
    ))
}
