use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const GENERATED_PASSWORD_BYTES: usize = 6;
const RESET_TOKEN_BYTES: usize = 32;

/// Well-formed hash with the default Argon2 parameters; no password matches it.
const DUMMY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$aREuI9Frly95eKjA+Rf+8Q$TnlVg/Pyh7vLvIZk8D6lx/FqngoMOE29MiNuYnAs9O8";

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?
        .to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash).map_err(|err| anyhow!(err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Spends the same Argon2 work as a real check when no account matched.
pub fn verify_against_dummy(password: &str) -> bool {
    verify_password(password, DUMMY_PASSWORD_HASH).unwrap_or(false)
}

/// Initial password for an account provisioned by an administrator.
pub fn generate_password() -> String {
    random_hex(GENERATED_PASSWORD_BYTES)
}

/// Raw reset token (256 bits) to be emailed; only its digest is stored.
pub fn generate_reset_token() -> String {
    random_hex(RESET_TOKEN_BYTES)
}

pub fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
