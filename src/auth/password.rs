//! PBKDF2 password hashing.
//!
//! Hashes use the ASP.NET Identity v3 binary layout so accounts migrated from
//! the previous system keep working:
//!
//! ```text
//! 0x01 | prf (u32 BE) | iterations (u32 BE) | salt length (u32 BE) | salt | subkey
//! ```
//!
//! encoded as standard base64. `prf` is 1 for HMAC-SHA256 and 2 for HMAC-SHA512.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::OnceCell;
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::{Sha256, Sha512};

use super::AuthError;

const FORMAT_MARKER: u8 = 0x01;
const PRF_HMAC_SHA256: u32 = 1;
const PRF_HMAC_SHA512: u32 = 2;
const SALT_LEN: usize = 16;
const SUBKEY_LEN: usize = 32;
const HEADER_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordVerification {
    Failed,
    Success,
    /// Correct password, but stored with weaker parameters than configured
    SuccessRehashNeeded,
}

#[derive(Debug, Clone)]
pub struct PasswordHasher {
    iterations: u32,
    dummy: OnceCell<String>,
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self { iterations: iterations.max(1), dummy: OnceCell::new() }
    }

    /// Spend the same PBKDF2 work as a real check when no account matches,
    /// so response time does not reveal which emails are registered.
    pub fn verify_dummy(&self, password: &str) {
        let _ = self.verify(self.dummy_hash(), password);
    }

    fn dummy_hash(&self) -> &str {
        self.dummy
            .get_or_init(|| self.hash_with_salt("no-such-account", &[0u8; SALT_LEN]))
    }

    pub fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        self.hash_with_salt(password, &salt)
    }

    fn hash_with_salt(&self, password: &str, salt: &[u8]) -> String {
        let mut subkey = [0u8; SUBKEY_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, self.iterations, &mut subkey);

        let mut out = Vec::with_capacity(HEADER_LEN + salt.len() + SUBKEY_LEN);
        out.push(FORMAT_MARKER);
        out.extend_from_slice(&PRF_HMAC_SHA256.to_be_bytes());
        out.extend_from_slice(&self.iterations.to_be_bytes());
        out.extend_from_slice(&(salt.len() as u32).to_be_bytes());
        out.extend_from_slice(salt);
        out.extend_from_slice(&subkey);
        STANDARD.encode(out)
    }

    pub fn verify(&self, stored: &str, password: &str) -> Result<PasswordVerification, AuthError> {
        let bytes = STANDARD
            .decode(stored.trim())
            .map_err(|e| AuthError::MalformedHash(e.to_string()))?;

        if bytes.len() < HEADER_LEN || bytes[0] != FORMAT_MARKER {
            return Err(AuthError::MalformedHash("unsupported hash format".to_string()));
        }

        let prf = read_u32(&bytes[1..5]);
        let iterations = read_u32(&bytes[5..9]);
        let salt_len = read_u32(&bytes[9..13]) as usize;

        if salt_len < 8 || bytes.len() < HEADER_LEN + salt_len + 16 {
            return Err(AuthError::MalformedHash("truncated hash".to_string()));
        }

        let salt = &bytes[HEADER_LEN..HEADER_LEN + salt_len];
        let expected = &bytes[HEADER_LEN + salt_len..];
        let mut actual = vec![0u8; expected.len()];

        match prf {
            PRF_HMAC_SHA256 => pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut actual),
            PRF_HMAC_SHA512 => pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, iterations, &mut actual),
            other => return Err(AuthError::MalformedHash(format!("unsupported prf {}", other))),
        }

        if !constant_time_eq(&actual, expected) {
            return Ok(PasswordVerification::Failed);
        }

        if prf != PRF_HMAC_SHA256 || iterations < self.iterations {
            Ok(PasswordVerification::SuccessRehashNeeded)
        } else {
            Ok(PasswordVerification::Success)
        }
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Constant-time comparison to prevent timing attacks
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Check a candidate password against the complexity rules.
/// Returns every rule that failed so clients can show them all at once.
pub fn validate_password(password: &str, min_length: usize) -> Result<(), AuthError> {
    let mut problems = Vec::new();

    if password.chars().count() < min_length {
        problems.push(format!("must be at least {} characters", min_length));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("must contain a digit".to_string());
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        problems.push("must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        problems.push("must contain an uppercase letter".to_string());
    }
    if password.chars().all(|c| c.is_alphanumeric()) {
        problems.push("must contain a non-alphanumeric character".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AuthError::WeakPassword(problems))
    }
}

/// A password is expired once `expiry_days` have passed since it was set.
/// Zero or negative `expiry_days` disables expiry.
pub fn is_password_expired(changed_at: DateTime<Utc>, expiry_days: i64, now: DateTime<Utc>) -> bool {
    if expiry_days <= 0 {
        return false;
    }
    changed_at + Duration::days(expiry_days) <= now
}
