//! Handshake authentication
//!
//! The first frame of every connection is its identity: either a player name
//! or `host:<secret>`. Only the host form is checked against a credential.

use std::fmt;

use crate::error::{GameError, GameResult};
use crate::types::{Identity, HOST_NAME};
use crate::validate::{validate, MAX_USERNAME_CHARS};

/// Prefix that marks an identity as a host login attempt
pub const HOST_PREFIX: &str = "host:";

/// The single shared host credential
#[derive(Clone)]
pub struct HostSecret(String);

impl HostSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Random 128-bit secret, hex encoded
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Only for the one-time startup log line
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, candidate: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), candidate.as_bytes())
    }
}

impl fmt::Debug for HostSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostSecret(<redacted>)")
    }
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub host_secret: HostSecret,
    /// True when the secret was generated rather than configured
    pub generated: bool,
}

impl AuthConfig {
    pub fn new(host_secret: HostSecret) -> Self {
        Self {
            host_secret,
            generated: false,
        }
    }

    /// Load auth config from environment variables.
    /// A missing or blank HOST_SECRET yields a freshly generated one.
    pub fn from_env() -> Self {
        match std::env::var("HOST_SECRET")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            Some(secret) => {
                if HOST_PREFIX.len() + secret.chars().count() > MAX_USERNAME_CHARS {
                    tracing::warn!(
                        "HOST_SECRET is longer than {} characters; host handshakes will be rejected",
                        MAX_USERNAME_CHARS - HOST_PREFIX.len()
                    );
                }
                Self::new(HostSecret::new(secret))
            }
            None => {
                tracing::warn!("HOST_SECRET not set, generating one for this run");
                Self {
                    host_secret: HostSecret::generate(),
                    generated: true,
                }
            }
        }
    }

    /// Turn a raw handshake string into an identity.
    ///
    /// Host attempts with a wrong secret fail with [`GameError::Auth`]. Player
    /// names are sanitized, may not contain `:` and may not be `host`.
    pub fn identify(&self, raw: &str) -> GameResult<Identity> {
        let identity = validate(raw, MAX_USERNAME_CHARS, "username")?;

        if let Some(secret) = identity.strip_prefix(HOST_PREFIX) {
            return if self.host_secret.matches(secret) {
                Ok(Identity::host())
            } else {
                Err(GameError::Auth)
            };
        }

        if identity.contains(':') {
            return Err(GameError::validation("username", "must not contain ':'"));
        }
        if identity.eq_ignore_ascii_case(HOST_NAME) {
            return Err(GameError::validation("username", "is reserved"));
        }

        Ok(Identity::player(identity))
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
