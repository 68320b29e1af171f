use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use password_hash::rand_core::OsRng;
use password_hash::SaltString;

use crate::error::WorldDbError;

/// Hash a credential for storage (argon2, random salt, PHC string).
pub fn hash_credential(credential: &str) -> Result<String, WorldDbError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(credential.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| WorldDbError::HashError(e.to_string()))
}

/// Check a credential against a stored hash.
pub fn verify_credential(credential: &str, hash: &str) -> Result<(), WorldDbError> {
    let parsed = PasswordHash::new(hash).map_err(|e| WorldDbError::HashError(e.to_string()))?;
    Argon2::default()
        .verify_password(credential.as_bytes(), &parsed)
        .map_err(|_| WorldDbError::InvalidCredential)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_credential("swordfish").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_credential("swordfish", &hash).is_ok());
        assert!(matches!(
            verify_credential("trout", &hash),
            Err(WorldDbError::InvalidCredential)
        ));
    }

    #[test]
    fn salts_differ() {
        assert_ne!(hash_credential("same").unwrap(), hash_credential("same").unwrap());
    }

    #[test]
    fn garbage_hash_is_a_hash_error() {
        assert!(matches!(
            verify_credential("x", "not-a-phc-string"),
            Err(WorldDbError::HashError(_))
        ));
    }
}
