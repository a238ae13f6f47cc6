//! In-process account and assessment endpoints
//!
//! `/functions/auth?action=...` handles register, login, me, refresh, logout
//! and assessment submission against the credential store and token service.
//! An action called with the wrong method is treated as unknown.

use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::assessment::{self, AssessmentResponse};
use crate::auth::{hash_password, verify_password, AuthRejection, IssuedToken};
use crate::server::response::{
    auth_header, parse_json, success_response, with_meta, RequestContext, ResponseMeta,
};
use crate::server::AppState;
use crate::store::UserRecord;
use crate::types::{GatewayError, Result};

#[derive(Debug, Default, Deserialize)]
struct FunctionQuery {
    action: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    email: Option<String>,
    password: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    spiritual_level: Option<String>,
    language_preference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssessmentRequest {
    responses: Vec<AssessmentResponse>,
}

/// Dispatch `/functions/auth` on its `action` query parameter
pub async fn handle_auth_function(
    state: &AppState,
    ctx: &RequestContext,
    req: Request<Bytes>,
) -> Result<Response<Full<Bytes>>> {
    let query: FunctionQuery = req
        .uri()
        .query()
        .map(serde_urlencoded::from_str::<FunctionQuery>)
        .transpose()
        .map_err(|e| GatewayError::Validation(format!("Invalid query string: {e}")))?
        .unwrap_or_default();
    let action = query.action.unwrap_or_default();

    debug!(request_id = %ctx.request_id, action = %action, "Auth function called");

    match (action.as_str(), ctx.method.clone()) {
        ("register", Method::POST) => register(state, req.body()).await,
        ("login", Method::POST) => login(state, req.body()).await,
        ("me", Method::GET) => me(state, &req).await,
        ("refresh", Method::POST) => refresh(state, &req).await,
        ("logout", Method::POST) => logout(state, &req).await,
        ("assessment", Method::POST) => submit_assessment(state, &req).await,
        _ => Err(GatewayError::NotFound(
            "The requested authentication endpoint does not exist".into(),
        )),
    }
}

fn required(field: Option<String>) -> Option<String> {
    field.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Minimal shape check: one `@`, non-empty local part, dotted domain, no spaces
fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn token_fields(issued: &IssuedToken) -> (String, String) {
    (issued.token.clone(), issued.expires_at.to_rfc3339())
}

async fn register(state: &AppState, body: &Bytes) -> Result<Response<Full<Bytes>>> {
    let request: RegisterRequest = parse_json(body)?;

    let (Some(email), Some(password), Some(first_name), Some(last_name)) = (
        required(request.email),
        request.password.filter(|p| !p.is_empty()),
        required(request.first_name),
        required(request.last_name),
    ) else {
        return Err(GatewayError::Validation(
            "Email, password, first name, and last name are required".into(),
        ));
    };

    if !is_plausible_email(&email) {
        return Err(GatewayError::Validation("Email address is not valid".into()));
    }

    let mut user = UserRecord::new(email, hash_password(&password)?, first_name, last_name);
    if let Some(level) = required(request.spiritual_level) {
        user.spiritual_level = level;
    }
    if let Some(language) = required(request.language_preference) {
        user.language_preference = language;
    }
    user.last_login = Some(Utc::now());

    state.store.create(&user).await?;
    info!(user_id = %user.id, "User registered");

    let issued = state
        .tokens
        .issue(&user.id, &user.email, &user.spiritual_level)?;
    let (token, expires_at) = token_fields(&issued);

    Ok(with_meta(
        success_response(
            StatusCode::CREATED,
            serde_json::json!({
                "message": "Registration successful",
                "token": token,
                "expiresAt": expires_at,
                "user": user.to_public(),
            }),
        ),
        ResponseMeta {
            user_id: Some(user.id),
            service: None,
        },
    ))
}

async fn login(state: &AppState, body: &Bytes) -> Result<Response<Full<Bytes>>> {
    let request: LoginRequest = parse_json(body)?;

    let (Some(email), Some(password)) = (
        required(request.email),
        request.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(GatewayError::Validation(
            "Email and password are required".into(),
        ));
    };

    let mut user = state
        .store
        .find_by_email(&email)
        .await?
        .ok_or_else(|| GatewayError::InvalidCredentials("No account found with this email".into()))?;

    if !verify_password(&password, &user.password_hash)? {
        debug!(user_id = %user.id, "Login with incorrect password");
        return Err(GatewayError::InvalidCredentials("Incorrect password".into()));
    }

    if !user.is_active() {
        return Err(AuthRejection::Inactive.into());
    }

    user.last_login = Some(Utc::now());
    state.store.save(&user).await?;
    info!(user_id = %user.id, "User logged in");

    let issued = state
        .tokens
        .issue(&user.id, &user.email, &user.spiritual_level)?;
    let (token, expires_at) = token_fields(&issued);

    Ok(with_meta(
        success_response(
            StatusCode::OK,
            serde_json::json!({
                "message": "Login successful",
                "token": token,
                "expiresAt": expires_at,
                "user": user.to_public(),
            }),
        ),
        ResponseMeta {
            user_id: Some(user.id),
            service: None,
        },
    ))
}

async fn me(state: &AppState, req: &Request<Bytes>) -> Result<Response<Full<Bytes>>> {
    let identity = state.gate.authenticate(auth_header(req.headers())).await?;

    Ok(with_meta(
        success_response(
            StatusCode::OK,
            serde_json::json!({ "user": identity.user.to_public() }),
        ),
        ResponseMeta {
            user_id: Some(identity.user.id),
            service: None,
        },
    ))
}

async fn refresh(state: &AppState, req: &Request<Bytes>) -> Result<Response<Full<Bytes>>> {
    let identity = state.gate.authenticate(auth_header(req.headers())).await?;
    let user = &identity.user;

    let issued = state
        .tokens
        .issue(&user.id, &user.email, &user.spiritual_level)?;
    let (token, expires_at) = token_fields(&issued);

    Ok(with_meta(
        success_response(
            StatusCode::OK,
            serde_json::json!({
                "message": "Token refreshed",
                "token": token,
                "expiresAt": expires_at,
            }),
        ),
        ResponseMeta {
            user_id: Some(user.id.clone()),
            service: None,
        },
    ))
}

/// Tokens are stateless; logout only acknowledges
async fn logout(state: &AppState, req: &Request<Bytes>) -> Result<Response<Full<Bytes>>> {
    let identity = state
        .gate
        .authenticate_optional(auth_header(req.headers()))
        .await;

    Ok(with_meta(
        success_response(
            StatusCode::OK,
            serde_json::json!({ "message": "Logged out successfully" }),
        ),
        ResponseMeta {
            user_id: identity.map(|i| i.user.id),
            service: None,
        },
    ))
}

async fn submit_assessment(
    state: &AppState,
    req: &Request<Bytes>,
) -> Result<Response<Full<Bytes>>> {
    let identity = state.gate.authenticate(auth_header(req.headers())).await?;
    let request: AssessmentRequest = parse_json(req.body())?;

    assessment::validate_responses(&request.responses).map_err(GatewayError::Validation)?;

    let scores = assessment::calculate_scores(&request.responses);
    let mut user = identity.user;
    let entry = assessment::apply_assessment(&mut user, scores, request.responses.len());
    state.store.save(&user).await?;

    let overall = scores.overall();
    info!(user_id = %user.id, overall, responses = entry.response_count, "Assessment recorded");

    Ok(with_meta(
        success_response(
            StatusCode::OK,
            serde_json::json!({
                "message": "Assessment recorded",
                "scores": scores,
                "overall": overall,
                "level": assessment::level_for_score(overall),
                "assessment": entry,
            }),
        ),
        ResponseMeta {
            user_id: Some(user.id),
            service: None,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_shape() {
        assert!(is_plausible_email("seeker@example.com"));
        assert!(is_plausible_email("a.b+c@mail.example.org"));
        assert!(!is_plausible_email("no-at-sign"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("a@localhost"));
        assert!(!is_plausible_email("a@b@c.com"));
        assert!(!is_plausible_email("a b@example.com"));
        assert!(!is_plausible_email("a@.com"));
    }

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required(Some("  x ".into())), Some("x".into()));
        assert_eq!(required(Some("   ".into())), None);
        assert_eq!(required(None), None);
    }
}
