//! Request authentication against the token service and the credential store

use std::sync::Arc;
use tracing::debug;

use super::jwt::{extract_bearer, Claims, TokenService};
use crate::store::{UserRecord, UserStore};
use crate::types::{GatewayError, Result};

/// Role required for the admin prefix
pub const ADMIN_ROLE: &str = "admin";

/// Role required for the research prefix
pub const RESEARCHER_ROLE: &str = "researcher";

/// Why a request was not authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No bearer token supplied
    Missing,
    /// Token failed signature, issuer, audience or format checks
    Malformed,
    Expired,
    /// Token is valid but its user no longer exists
    UserGone,
    /// User exists but is not active
    Inactive,
}

impl AuthRejection {
    /// Value of the `reason` field in the error envelope
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::UserGone => "user-gone",
            Self::Inactive => "inactive",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Missing => "Access token required",
            Self::Malformed => "Invalid access token",
            Self::Expired => "Access token has expired",
            Self::UserGone => "User for this token no longer exists",
            Self::Inactive => "User account is inactive",
        }
    }
}

impl std::fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// An authenticated caller
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: UserRecord,
    pub claims: Claims,
}

impl Identity {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.user.has_role(role)
    }
}

/// Verifies bearer tokens and resolves them to active users
#[derive(Debug, Clone)]
pub struct AuthGate {
    tokens: Arc<TokenService>,
    store: Arc<UserStore>,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenService>, store: Arc<UserStore>) -> Self {
        Self { tokens, store }
    }

    /// Require a valid token for an existing, active user
    ///
    /// Rejections are 401 with a reason; storage faults surface as 500.
    pub async fn authenticate(&self, auth_header: Option<&str>) -> Result<Identity> {
        let token = extract_bearer(auth_header).ok_or(AuthRejection::Missing)?;

        let claims = self.tokens.verify(token)?;

        let user = self
            .store
            .find(&claims.sub)
            .await?
            .ok_or(AuthRejection::UserGone)?;

        if !user.is_active() {
            return Err(AuthRejection::Inactive.into());
        }

        Ok(Identity { user, claims })
    }

    /// Authenticate if possible; every rejection becomes an anonymous caller
    pub async fn authenticate_optional(&self, auth_header: Option<&str>) -> Option<Identity> {
        match self.authenticate(auth_header).await {
            Ok(identity) => Some(identity),
            Err(GatewayError::Unauthorized(AuthRejection::Missing)) => None,
            Err(e) => {
                debug!(error = %e, "Ignoring invalid credentials on optional-auth route");
                None
            }
        }
    }

    /// Require `admin` on top of a valid token
    pub async fn authenticate_admin(&self, auth_header: Option<&str>) -> Result<Identity> {
        let identity = self.authenticate(auth_header).await?;
        require_role(&identity, ADMIN_ROLE)?;
        Ok(identity)
    }
}

/// Fail with 403 unless the identity carries `role`
pub fn require_role(identity: &Identity, role: &str) -> Result<()> {
    if identity.has_role(role) {
        Ok(())
    } else {
        debug!(user_id = %identity.user_id(), role = %role, "Role check failed");
        Err(GatewayError::InsufficientPermissions {
            required: role.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UserStatus;
    use std::time::Duration;

    struct Fixture {
        _tmp: tempfile::TempDir,
        gate: AuthGate,
        tokens: Arc<TokenService>,
        store: Arc<UserStore>,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let tokens = Arc::new(
            TokenService::new(
                "gate-test-secret-that-is-at-least-32-chars",
                Duration::from_secs(600),
                "six-perfections-json",
                "six-perfections-app",
            )
            .unwrap(),
        );
        let store = Arc::new(UserStore::new(tmp.path()));
        Fixture {
            gate: AuthGate::new(tokens.clone(), store.clone()),
            _tmp: tmp,
            tokens,
            store,
        }
    }

    async fn saved_user(f: &Fixture, roles: &[&str]) -> (UserRecord, String) {
        let mut user = UserRecord::new(
            "gate@example.com".into(),
            "$argon2id$test".into(),
            "Gate".into(),
            "Keeper".into(),
        );
        user.roles = roles.iter().map(|r| r.to_string()).collect();
        f.store.save(&user).await.unwrap();
        let token = f
            .tokens
            .issue(&user.id, &user.email, &user.spiritual_level)
            .unwrap()
            .token;
        (user, format!("Bearer {token}"))
    }

    fn rejection(result: Result<Identity>) -> Option<&'static str> {
        result.err().and_then(|e| e.reason())
    }

    #[tokio::test]
    async fn test_valid_token_yields_identity() {
        let f = fixture();
        let (user, header) = saved_user(&f, &[]).await;

        let identity = f.gate.authenticate(Some(&header)).await.unwrap();
        assert_eq!(identity.user_id(), user.id);
        assert_eq!(identity.claims.email, "gate@example.com");
    }

    #[tokio::test]
    async fn test_rejection_reasons() {
        let f = fixture();

        assert_eq!(rejection(f.gate.authenticate(None).await), Some("missing"));
        assert_eq!(
            rejection(f.gate.authenticate(Some("Bearer not.a.jwt")).await),
            Some("malformed")
        );

        let expired = f
            .tokens
            .issue_with_ttl("someone", "x@example.com", "beginner", Duration::ZERO)
            .unwrap();
        assert_eq!(
            rejection(
                f.gate
                    .authenticate(Some(&format!("Bearer {}", expired.token)))
                    .await
            ),
            Some("expired")
        );

        let orphan = f.tokens.issue("no-such-user", "x@example.com", "beginner").unwrap();
        assert_eq!(
            rejection(
                f.gate
                    .authenticate(Some(&format!("Bearer {}", orphan.token)))
                    .await
            ),
            Some("user-gone")
        );
    }

    #[tokio::test]
    async fn test_inactive_user_rejected() {
        let f = fixture();
        let (mut user, header) = saved_user(&f, &[]).await;
        user.status = UserStatus::Inactive;
        f.store.save(&user).await.unwrap();

        assert_eq!(
            rejection(f.gate.authenticate(Some(&header)).await),
            Some("inactive")
        );
    }

    #[tokio::test]
    async fn test_optional_auth_collapses_rejections() {
        let f = fixture();
        let (_, header) = saved_user(&f, &[]).await;

        assert!(f.gate.authenticate_optional(None).await.is_none());
        assert!(f.gate.authenticate_optional(Some("Bearer junk")).await.is_none());
        assert!(f.gate.authenticate_optional(Some(&header)).await.is_some());
    }

    #[tokio::test]
    async fn test_admin_requires_role() {
        let f = fixture();
        let (_, header) = saved_user(&f, &[RESEARCHER_ROLE]).await;

        let err = f.gate.authenticate_admin(Some(&header)).await.unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_PERMISSIONS");

        let f = fixture();
        let (_, header) = saved_user(&f, &[ADMIN_ROLE]).await;
        assert!(f.gate.authenticate_admin(Some(&header)).await.is_ok());
    }
}
