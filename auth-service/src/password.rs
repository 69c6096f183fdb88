use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;
use rand_core::OsRng;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("password worker failed: {0}")]
    Worker(String),
}

// Verified against when the identifier is unknown so both login failures cost the same.
static DUMMY_HASH: Lazy<String> = Lazy::new(|| match hash_password("not-a-real-password") {
    Ok(hash) => hash,
    Err(err) => {
        error!(
            error = %err,
            "failed to build dummy password hash; unknown-identifier logins will be fast"
        );
        String::new()
    }
});

/// Salted Argon2id hash in PHC string format.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    if password.trim().is_empty() {
        return Err(PasswordError::Empty);
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| PasswordError::Hash(err.to_string()))
}

/// False for a wrong password and for a stored hash that does not parse.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub async fn hash_password_blocking(password: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|err| PasswordError::Worker(err.to_string()))?
}

pub async fn verify_password_blocking(
    password: String,
    hash: String,
) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|err| PasswordError::Worker(err.to_string()))
}

/// Runs a verification whose result is discarded.
pub async fn burn_verification(password: String) {
    let _ = tokio::task::spawn_blocking(move || verify_password(&password, &DUMMY_HASH)).await;
}
