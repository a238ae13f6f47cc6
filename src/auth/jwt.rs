//! Bearer token issuing and verification
//!
//! Tokens are HS256 JWTs carrying the user id, email and spiritual level,
//! plus issuer and audience claims that are checked on every verification.
//!
//! Expiry is enforced with zero leeway: a token whose `exp` is not strictly in
//! the future is expired, so a token issued with a zero ttl never verifies.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::MIN_JWT_SECRET_LEN;
use crate::types::GatewayError;

/// Payload stored in the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    /// Spiritual level at the time of issue
    pub level: String,
    pub iss: String,
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// A freshly signed token and the moment it stops being valid
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Why a token failed verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Token issuer and verifier
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry: Duration,
    issuer: String,
    audience: String,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("expiry", &self.expiry)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a new token service
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(
        secret: &str,
        expiry: Duration,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        if secret.is_empty() {
            return Err(GatewayError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(GatewayError::Config(format!(
                "JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters"
            )));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry,
            issuer: issuer.into(),
            audience: audience.into(),
        })
    }

    /// Issue a token with the configured expiry
    pub fn issue(&self, user_id: &str, email: &str, level: &str) -> Result<IssuedToken, TokenError> {
        self.issue_with_ttl(user_id, email, level, self.expiry)
    }

    /// Issue a token that expires `ttl` from now
    pub fn issue_with_ttl(
        &self,
        user_id: &str,
        email: &str,
        level: &str,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let now = unix_now()?;
        let exp = now
            .checked_add(ttl.as_secs())
            .ok_or_else(|| TokenError::Signing(format!("token lifetime {ttl:?} overflows")))?;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            level: level.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        let expires_at = i64::try_from(exp)
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .ok_or_else(|| TokenError::Signing(format!("expiry {exp} out of range")))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify signature, issuer, audience and expiry, returning the claims
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed(err.to_string()),
            })?;

        if claims.exp <= unix_now()? {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| TokenError::Signing(format!("System time error: {e}")))
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn extract_bearer(auth_header: Option<&str>) -> Option<&str> {
    let token = auth_header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "six-perfections-json";
    const AUDIENCE: &str = "six-perfections-app";

    fn test_service() -> TokenService {
        TokenService::new(
            "test-secret-that-is-at-least-32-characters-long",
            Duration::from_secs(3600),
            ISSUER,
            AUDIENCE,
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_verify_token() {
        let service = test_service();

        let issued = service.issue("user-123", "test@example.com", "beginner").unwrap();
        assert!(!issued.token.is_empty());
        assert!(issued.expires_at > Utc::now());

        let claims = service.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.level, "beginner");
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.aud, AUDIENCE);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let service = test_service();
        let issued = service
            .issue_with_ttl("user-123", "test@example.com", "beginner", Duration::ZERO)
            .unwrap();

        assert_eq!(service.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_overflowing_ttl_is_a_signing_error() {
        let service = test_service();
        let err = service
            .issue_with_ttl("user-123", "test@example.com", "beginner", Duration::MAX)
            .unwrap_err();
        assert!(matches!(err, TokenError::Signing(_)));

        // fits in u64 but not in a timestamp
        let err = service
            .issue_with_ttl(
                "user-123",
                "test@example.com",
                "beginner",
                Duration::from_secs(i64::MAX as u64),
            )
            .unwrap_err();
        assert!(matches!(err, TokenError::Signing(_)));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let service = test_service();
        assert!(matches!(
            service.verify("invalid-token"),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let other = TokenService::new(
            "different-secret-that-is-at-least-32-characters",
            Duration::from_secs(3600),
            ISSUER,
            AUDIENCE,
        )
        .unwrap();

        let issued = test_service().issue("user-123", "a@b.test", "beginner").unwrap();
        assert!(matches!(
            other.verify(&issued.token),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let other = TokenService::new(
            "test-secret-that-is-at-least-32-characters-long",
            Duration::from_secs(3600),
            ISSUER,
            "some-other-app",
        )
        .unwrap();

        let issued = test_service().issue("user-123", "a@b.test", "beginner").unwrap();
        assert!(other.verify(&issued.token).is_err());
    }

    #[test]
    fn test_secret_validation() {
        let hour = Duration::from_secs(3600);
        assert!(TokenService::new("short", hour, ISSUER, AUDIENCE).is_err());
        assert!(TokenService::new("", hour, ISSUER, AUDIENCE).is_err());
        assert!(
            TokenService::new("this-secret-is-at-least-32-chars-long", hour, ISSUER, AUDIENCE)
                .is_ok()
        );
    }

    #[test]
    fn test_dev_secret_is_accepted() {
        let service = TokenService::new(
            crate::config::DEV_JWT_SECRET,
            Duration::from_secs(60),
            ISSUER,
            AUDIENCE,
        )
        .unwrap();
        let issued = service.issue("user-1", "dev@example.com", "advanced").unwrap();
        assert!(service.verify(&issued.token).is_ok());
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_bearer(Some("Bearer  abc123 ")), Some("abc123"));

        assert_eq!(extract_bearer(None), None);
        assert_eq!(extract_bearer(Some("")), None);
        assert_eq!(extract_bearer(Some("Bearer ")), None);
        assert_eq!(extract_bearer(Some("abc123")), None);
        assert_eq!(extract_bearer(Some("Basic abc123")), None);
    }
}
