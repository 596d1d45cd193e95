//! Venue API credentials and tier derivation.
//!
//! `tier = privileged` iff key, secret and passphrase are all non-empty,
//! the key is not the public sentinel, and the key is at least 10 bytes.

use serde::{Deserialize, Serialize};

/// The sentinel key value that forces public tier even if secret/passphrase
/// are present.
pub const PUBLIC_SENTINEL: &str = "PUBLIC_ACCESS";

const MIN_KEY_LEN: usize = 10;

/// A venue API credential triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
}

impl Credentials {
    pub fn new(
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            passphrase: passphrase.into(),
        }
    }

    /// Whether this triple qualifies for the privileged tier.
    pub fn is_privileged(&self) -> bool {
        !self.api_key.is_empty()
            && !self.secret_key.is_empty()
            && !self.passphrase.is_empty()
            && self.api_key != PUBLIC_SENTINEL
            && self.api_key.len() >= MIN_KEY_LEN
    }

    /// Build from environment-style optional strings, as read from
    /// `BITGET_API_KEY` / `BITGET_SECRET_KEY` / `BITGET_PASSPHRASE`. A
    /// missing or empty value yields `None`, which is always public tier.
    pub fn from_env_values(
        api_key: Option<String>,
        secret_key: Option<String>,
        passphrase: Option<String>,
    ) -> Option<Self> {
        let creds = Self::new(
            api_key.unwrap_or_default(),
            secret_key.unwrap_or_default(),
            passphrase.unwrap_or_default(),
        );
        if creds.api_key.is_empty() && creds.secret_key.is_empty() && creds.passphrase.is_empty() {
            None
        } else {
            Some(creds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_valid_triple_is_privileged() {
        let c = Credentials::new("a-long-enough-key", "secret", "pass");
        assert!(c.is_privileged());
    }

    #[test]
    fn sentinel_key_is_never_privileged() {
        let c = Credentials::new(PUBLIC_SENTINEL, "0123456789", "pass");
        assert!(!c.is_privileged());
    }

    #[test]
    fn short_key_is_not_privileged() {
        let c = Credentials::new("short", "secret", "pass");
        assert!(!c.is_privileged());
    }

    #[test]
    fn empty_passphrase_is_not_privileged() {
        let c = Credentials::new("a-long-enough-key", "secret", "");
        assert!(!c.is_privileged());
    }
}
