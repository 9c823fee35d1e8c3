//! Password hashing and API token generation.
//!
//! Passwords are stored as Argon2id PHC strings. Hashing is CPU-bound, so the
//! async wrappers move the work onto Tokio's blocking pool.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Length of an API token key in hex characters.
pub const TOKEN_LEN: usize = 40;

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// Returns `false` for a wrong password and for an unparsable stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash is not a valid PHC string: {}", e);
            false
        }
    }
}

pub async fn hash_password_blocking(password: String) -> AppResult<String> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
    Ok(hash)
}

pub async fn verify_password_blocking(password: String, stored_hash: String) -> AppResult<bool> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash)).await?)
}

/// Generates a fresh random token key of [`TOKEN_LEN`] lowercase hex characters.
pub fn generate_token() -> String {
    let mut key = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    key.truncate(TOKEN_LEN);
    key
}

/// Password policy applied on registration and password change.
pub fn validate_password(password: &str, username: &str, email: &str) -> AppResult<()> {
    let field = "password";
    if password.chars().count() < 8 {
        return Err(AppError::validation(field, "This password is too short. It must contain at least 8 characters"));
    }
    if password.chars().count() > 128 {
        return Err(AppError::validation(field, "This password is too long"));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation(field, "This password is entirely numeric"));
    }
    let lowered = password.to_lowercase();
    let local_part = email.split('@').next().unwrap_or_default().to_lowercase();
    if lowered == username.to_lowercase() || lowered == email.to_lowercase() || lowered == local_part {
        return Err(AppError::validation(field, "The password is too similar to the account details"));
    }
    Ok(())
}

/// Parses `Authorization: Token <key>`. Returns `None` for other schemes or a malformed key.
pub fn parse_token_header(value: &str) -> Option<&str> {
    let (scheme, key) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("token") {
        return None;
    }
    let key = key.trim();
    if key.len() == TOKEN_LEN && key.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(key)
    } else {
        None
    }
}
