//! Email confirmation tokens. Only the SHA-256 digest is persisted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use super::password::constant_time_eq;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct ConfirmationToken {
    /// Sent to the user, never stored
    pub token: String,
    pub digest: String,
    pub expires_at: DateTime<Utc>,
}

impl ConfirmationToken {
    pub fn generate(lifetime_hours: i64, now: DateTime<Utc>) -> Self {
        let mut raw = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut raw);
        let token = URL_SAFE_NO_PAD.encode(raw);
        let digest = digest(&token);
        Self {
            token,
            digest,
            expires_at: now + Duration::hours(lifetime_hours),
        }
    }
}

pub fn digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compare a presented token with the stored digest and expiry
pub fn matches(
    presented: &str,
    stored_digest: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let (Some(stored), Some(expires_at)) = (stored_digest, expires_at) else {
        return false;
    };
    if expires_at <= now {
        return false;
    }
    constant_time_eq(digest(presented).as_bytes(), stored.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_matches_its_digest() {
        let now = Utc::now();
        let issued = ConfirmationToken::generate(24, now);
        assert!(matches(&issued.token, Some(&issued.digest), Some(issued.expires_at), now));
        assert!(!matches("forged", Some(&issued.digest), Some(issued.expires_at), now));
    }

    #[test]
    fn expired_or_missing_tokens_fail() {
        let now = Utc::now();
        let issued = ConfirmationToken::generate(1, now);
        assert!(!matches(&issued.token, Some(&issued.digest), Some(issued.expires_at), now + Duration::hours(2)));
        assert!(!matches(&issued.token, None, Some(issued.expires_at), now));
    }

    #[test]
    fn tokens_are_url_safe() {
        let issued = ConfirmationToken::generate(1, Utc::now());
        assert!(issued.token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(issued.digest.len(), 64);
    }
}
