//! Salted, slow one-way hashing of login secrets.
//!
//! Hashes are Argon2id PHC strings, so the salt and parameters travel with the
//! hash and verification needs nothing else. The derived output is compared in
//! constant time by `password-hash`.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Memory cost in KiB.
pub const DEFAULT_MEMORY_KIB: u32 = 19 * 1024;
/// Number of passes over memory.
pub const DEFAULT_ITERATIONS: u32 = 2;
const LANES: u32 = 1;

// Hashed at startup so unknown handles cost one verification, same as known ones.
const DUMMY_SECRET: &str = "gatehouse-dummy-secret";

#[derive(Clone)]
pub struct SecretHasher {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl std::fmt::Debug for SecretHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretHasher")
            .field("params", self.argon2.params())
            .finish_non_exhaustive()
    }
}

impl SecretHasher {
    /// Build a hasher with the production cost parameters.
    ///
    /// # Errors
    /// Returns an error if the parameters are rejected or the dummy hash fails.
    pub fn new() -> Result<Self> {
        Self::with_cost(DEFAULT_MEMORY_KIB, DEFAULT_ITERATIONS)
    }

    /// Build a hasher with explicit cost parameters (tests use cheap ones).
    ///
    /// # Errors
    /// Returns an error if the parameters are rejected or the dummy hash fails.
    pub fn with_cost(memory_kib: u32, iterations: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, LANES, None)
            .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&argon2, DUMMY_SECRET)?;
        Ok(Self { argon2, dummy_hash })
    }

    /// Hash a secret with a fresh random salt.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn hash(&self, secret: &str) -> Result<String> {
        hash_with(&self.argon2, secret)
    }

    /// Check a secret against a stored PHC hash. Unparseable hashes never verify.
    #[must_use]
    pub fn verify(&self, secret: &str, secret_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(secret_hash) else {
            return false;
        };
        self.argon2
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }

    /// Burn one verification for a handle that does not exist.
    pub fn dummy_verify(&self, secret: &str) {
        let _ = self.verify(secret, &self.dummy_hash);
    }
}

fn hash_with(argon2: &Argon2<'static>, secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash secret: {err}"))
}
