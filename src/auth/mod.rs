//! Authentication and authorization
//!
//! Provides:
//! - Token issuing and verification (HS256 JWT)
//! - Password hashing with Argon2
//! - The auth gate that resolves bearer tokens to active users, and role checks

pub mod gate;
pub mod jwt;
pub mod password;

pub use gate::{require_role, AuthGate, AuthRejection, Identity, ADMIN_ROLE, RESEARCHER_ROLE};
pub use jwt::{extract_bearer, Claims, IssuedToken, TokenError, TokenService};
pub use password::{hash_password, verify_password};
