//! Salted password hashing for stored credentials.
//!
//! # Purpose
//! Produces the `(salt, hash)` pair persisted for every account and verifies a
//! login attempt against it.
//!
//! # Security notes
//! - Salts are 16 random bytes per account from the thread RNG.
//! - Hashes are derived with Argon2id (default parameters) into 32 bytes.
//! - Verification compares in constant time.
//! - Neither passwords nor derived material are logged.
use anyhow::{Result, anyhow};
use argon2::Argon2;
use rand::RngCore;
use subtle::ConstantTimeEq;

pub const SALT_LEN: usize = 16;
pub const HASH_LEN: usize = 32;

pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive the stored hash for `password` under `salt`.
///
/// # Errors
/// - The salt is shorter than Argon2 accepts (8 bytes).
pub fn hash_password(password: &str, salt: &[u8]) -> Result<Vec<u8>> {
    let mut hash = vec![0u8; HASH_LEN];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut hash)
        .map_err(|err| anyhow!("derive password hash: {err}"))?;
    Ok(hash)
}

/// Returns true when `password` hashes to `expected` under `salt`.
///
/// A derivation failure (e.g. a corrupt stored salt) counts as a mismatch.
pub fn verify_password(password: &str, salt: &[u8], expected: &[u8]) -> bool {
    match hash_password(password, salt) {
        Ok(actual) => actual.ct_eq(expected).into(),
        Err(err) => {
            tracing::warn!(error = %err, "stored credential could not be verified");
            false
        }
    }
}
