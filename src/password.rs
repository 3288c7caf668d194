//! Password hashing for account credentials.
//!
//! Digests are Argon2id [PHC strings][phc], so the parameters used to create a digest travel
//! with it and verification doesn't depend on the currently configured cost.
//!
//! [phc]: https://github.com/P-H-C/phc-string-format/blob/master/phc-sf-spec.md

use crate::error::Error;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

/// Time cost used when none is configured.
pub const DEFAULT_COST: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

impl PasswordHasher {
    /// A hasher with the given Argon2 time cost (number of passes, at least 1).
    #[must_use]
    pub fn new(cost: u32) -> Self {
        Self { cost: cost.max(1) }
    }

    /// Hash `password` with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PasswordHash`] if the parameters are rejected or hashing fails.
    pub fn hash(&self, password: &str) -> Result<String, Error> {
        let params = Params::new(Params::DEFAULT_M_COST, self.cost, Params::DEFAULT_P_COST, None)
            .map_err(|e| Error::PasswordHash(e.to_string()))?;
        let salt = SaltString::generate(&mut OsRng);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::PasswordHash(e.to_string()))
    }

    /// Verify `password` against a stored digest. The digest comparison is constant-time.
    /// A digest that can't be parsed never verifies.
    #[must_use]
    pub fn verify(digest: &str, password: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hasher = PasswordHasher::new(1);
        let digest = hasher.hash("secret").unwrap();
        assert!(digest.starts_with("$argon2id$"));
        assert!(!digest.contains("secret"));
        assert!(PasswordHasher::verify(&digest, "secret"));
        assert!(!PasswordHasher::verify(&digest, "Secret"));
        assert!(!PasswordHasher::verify(&digest, ""));
    }

    #[test]
    fn salts_differ() {
        let hasher = PasswordHasher::new(1);
        assert_ne!(hasher.hash("secret").unwrap(), hasher.hash("secret").unwrap());
    }

    #[test]
    fn garbage_digest_never_verifies() {
        assert!(!PasswordHasher::verify("", "secret"));
        assert!(!PasswordHasher::verify("secret", "secret"));
    }
}
