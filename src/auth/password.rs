//! Password hashing using Argon2id.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use super::AuthError;

/// Well-formed Argon2id hash with the default cost parameters that no
/// password matches. Unknown usernames are checked against it so that
/// they cost the same as a wrong password.
const UNKNOWN_USER_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$Y2xpZW50ZGVzay1kdW1teQ$AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8";

/// Hash a plaintext password into an Argon2id PHC string with a fresh salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Crypto(format!("password hash error: {e}")))
}

/// Verify a plaintext password against a stored PHC string.
///
/// Returns `Ok(false)` on mismatch and `Err` only when the stored hash
/// itself is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
    }
}

/// [`hash_password`] on the blocking pool.
pub async fn hash_password_off_runtime(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Crypto(format!("password hash task failed: {e}")))?
}

/// [`verify_password`] on the blocking pool. A missing hash is verified
/// against a decoy and always returns `Ok(false)`.
pub async fn verify_password_off_runtime(
    password: String,
    hash: Option<String>,
) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_password(&password, &hash),
        None => verify_password(&password, UNKNOWN_USER_HASH).map(|_| false),
    })
    .await
    .map_err(|e| AuthError::Crypto(format!("password verify task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(matches!(
            verify_password("pw", "plaintext"),
            Err(AuthError::Crypto(_))
        ));
    }

    #[test]
    fn test_unknown_user_hash_parses_and_never_matches() {
        let parsed = PasswordHash::new(UNKNOWN_USER_HASH).unwrap();
        assert_eq!(parsed.algorithm.as_str(), "argon2id");
        assert!(!verify_password("", UNKNOWN_USER_HASH).unwrap());
        assert!(!verify_password("admin", UNKNOWN_USER_HASH).unwrap());
    }

    #[tokio::test]
    async fn test_off_runtime_helpers() {
        let hash = hash_password_off_runtime("correct horse".to_string())
            .await
            .unwrap();
        assert!(verify_password_off_runtime("correct horse".to_string(), Some(hash.clone()))
            .await
            .unwrap());
        assert!(!verify_password_off_runtime("battery staple".to_string(), Some(hash))
            .await
            .unwrap());
        assert!(!verify_password_off_runtime("correct horse".to_string(), None)
            .await
            .unwrap());
    }
}
