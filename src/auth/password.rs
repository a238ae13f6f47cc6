//! Password hashing and verification using Argon2
//!
//! Stored hashes are PHC strings, so the salt and parameters travel with them.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::GatewayError;

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, GatewayError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| GatewayError::Internal(format!("Failed to hash password: {e}")))
}

/// Check a candidate password against a stored hash
///
/// A stored value that is not a PHC string is a data fault, reported as an
/// error rather than a mismatch.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, GatewayError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| GatewayError::Storage(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
