//! Durable per-user credential record
//!
//! One record per (provider, user), keyed by username. The two opaque
//! secrets mean different things per dialect: OAuth1 stores the token and
//! token-secret pair; OAuth2 stores the access and refresh tokens.
//! `expires_at` is an absolute unix timestamp in milliseconds, computed at
//! storage time from the provider's `expires_in` delta; `None` means local
//! time says nothing and the credential must be verified with the provider.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Which OAuth protocol version governs a record's fields and refresh
/// behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    OAuth1,
    OAuth2,
}

impl Dialect {
    /// Dialect label for logging.
    pub fn label(self) -> &'static str {
        match self {
            Dialect::OAuth1 => "oauth1",
            Dialect::OAuth2 => "oauth2",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A user's durable authentication result, usable for protected-resource
/// calls until it expires or the provider invalidates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Opaque unique key for the end user.
    pub username: String,
    pub dialect: Dialect,
    /// OAuth1: access token. OAuth2: access token.
    pub primary_secret: String,
    /// OAuth1: token secret. OAuth2: refresh token.
    pub secondary_secret: String,
    /// Absolute expiry, unix milliseconds. `None`: only the provider knows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Granted scopes (OAuth2 only; empty for OAuth1).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub scopes: BTreeSet<String>,
}

impl CredentialRecord {
    /// Whether the record is expired at `now_millis`.
    ///
    /// The boundary is inclusive: `now == expires_at` is expired, with no
    /// grace window. A record without an expiry is never *locally* expired;
    /// it needs a provider-side `verify` instead.
    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        matches!(self.expires_at, Some(expires) if now_millis >= expires)
    }

    /// Whether a refresh can even be attempted (non-empty refresh secret).
    pub fn has_refresh_secret(&self) -> bool {
        !self.secondary_secret.is_empty()
    }

    /// A record is persisted whole or not at all; this is the guard the
    /// store applies before any write.
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty()
            && !self.primary_secret.is_empty()
            && !self.secondary_secret.is_empty()
    }
}
