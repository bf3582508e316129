//! bcrypt password hashing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

/// Hash a password for storage in a principal directory.
///
/// # Errors
/// Returns an error if the cost is outside 4..=31 or hashing fails.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).context("failed to hash password")
}

/// Constant-time check of `password` against a stored bcrypt hash.
///
/// # Errors
/// Returns an error if the stored hash is malformed; a wrong password is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).context("failed to verify password hash")
}

/// Run [`verify_password`] on the blocking pool; bcrypt is deliberately slow.
///
/// # Errors
/// Returns an error if the stored hash is malformed or the task panics.
pub async fn verify_password_blocking(password: SecretString, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(password.expose_secret(), &hash))
        .await
        .context("password verification task failed")?
}

/// Run [`hash_password`] on the blocking pool.
///
/// # Errors
/// Returns an error if hashing fails or the task panics.
pub async fn hash_password_blocking(password: SecretString, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(password.expose_secret(), cost))
        .await
        .context("password hashing task failed")?
}

/// Checks a presented password against a stored hash.
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    async fn verify(&self, password: SecretString, hash: String) -> Result<bool>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BcryptVerifier;

#[async_trait]
impl PasswordVerifier for BcryptVerifier {
    async fn verify(&self, password: SecretString, hash: String) -> Result<bool> {
        verify_password_blocking(password, hash).await
    }
}

/// Compare two byte strings without short-circuiting on the first mismatch.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() -> Result<()> {
        let hash = hash_password("pw", 4)?;
        assert!(hash.starts_with("$2"));
        assert!(verify_password("pw", &hash)?);
        assert!(!verify_password("wrong", &hash)?);
        Ok(())
    }

    #[test]
    fn hashes_are_salted() -> Result<()> {
        assert_ne!(hash_password("pw", 4)?, hash_password("pw", 4)?);
        Ok(())
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("pw", "not-a-bcrypt-hash").is_err());
    }

    #[test]
    fn constant_time_eq_compares_whole_input() {
        assert!(constant_time_eq(b"client-secret", b"client-secret"));
        assert!(!constant_time_eq(b"client-secret", b"client-secreT"));
        assert!(!constant_time_eq(b"client-secret", b"client-secret2"));
        assert!(!constant_time_eq(b"", b"s"));
        assert!(constant_time_eq(b"", b""));
    }

    #[tokio::test]
    async fn bcrypt_verifier_matches_blocking_hash() -> Result<()> {
        let hash = hash_password_blocking(SecretString::from("pw".to_string()), 4).await?;
        let verifier = BcryptVerifier;
        assert!(verifier.verify(SecretString::from("pw".to_string()), hash.clone()).await?);
        assert!(!verifier.verify(SecretString::from("nope".to_string()), hash).await?);
        Ok(())
    }

    #[test]
    fn invalid_cost_is_an_error() {
        assert!(hash_password("pw", 2).is_err());
    }

    #[tokio::test]
    async fn verify_on_blocking_pool() -> Result<()> {
        let hash = hash_password("pw", 4)?;
        assert!(verify_password_blocking(SecretString::from("pw".to_string()), hash.clone()).await?);
        assert!(!verify_password_blocking(SecretString::from("nope".to_string()), hash).await?);
        Ok(())
    }
}
