//! Ephemeral flow state bridging `begin_flow` and `complete_flow`
//!
//! One session per in-progress authentication attempt, keyed by username.
//! The orchestrator owns session lifetime exclusively: created at flow
//! start, consumed exactly once when the callback is handled, superseded if
//! the user starts over. The core enforces no expiry; abandoned sessions are
//! cleaned up by the caller's garbage-collection policy, if any.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::Dialect;

/// Dialect-specific state carried between flow start and callback.
#[derive(Clone)]
pub enum FlowState {
    /// OAuth1 request-token pair, exchanged with the verifier later.
    OAuth1 {
        request_token: String,
        request_token_secret: String,
    },
    /// OAuth2 CSRF state plus the PKCE verifier sent during code exchange.
    OAuth2 {
        csrf_state: String,
        pkce_verifier: String,
    },
}

/// In-progress authentication attempt for one user.
#[derive(Clone)]
pub struct FlowSession {
    pub username: String,
    pub dialect: Dialect,
    pub state: FlowState,
    pub created_at: Instant,
}

impl FlowSession {
    /// New OAuth1 session holding the short-lived request-token pair.
    pub fn oauth1(
        username: impl Into<String>,
        request_token: impl Into<String>,
        request_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            dialect: Dialect::OAuth1,
            state: FlowState::OAuth1 {
                request_token: request_token.into(),
                request_token_secret: request_token_secret.into(),
            },
            created_at: Instant::now(),
        }
    }

    /// New OAuth2 session holding the CSRF state and PKCE verifier.
    pub fn oauth2(
        username: impl Into<String>,
        csrf_state: impl Into<String>,
        pkce_verifier: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            dialect: Dialect::OAuth2,
            state: FlowState::OAuth2 {
                csrf_state: csrf_state.into(),
                pkce_verifier: pkce_verifier.into(),
            },
            created_at: Instant::now(),
        }
    }

    /// Time since the flow was started; the input to caller-side GC.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Query parameters the provider sent to the callback endpoint.
///
/// Carries `oauth_token`/`oauth_verifier` for OAuth1 and `code`/`state` for
/// OAuth2; the HTTP layer hands them over without interpreting them.
#[derive(Debug, Clone, Default)]
pub struct CallbackPayload(HashMap<String, String>);

impl CallbackPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth1_session_carries_request_token_pair() {
        let session = FlowSession::oauth1("alice", "req_tok", "req_sec");
        assert_eq!(session.username, "alice");
        assert_eq!(session.dialect, Dialect::OAuth1);
        match session.state {
            FlowState::OAuth1 {
                request_token,
                request_token_secret,
            } => {
                assert_eq!(request_token, "req_tok");
                assert_eq!(request_token_secret, "req_sec");
            }
            FlowState::OAuth2 { .. } => panic!("wrong dialect state"),
        }
    }

    #[test]
    fn oauth2_session_carries_state_and_verifier() {
        let session = FlowSession::oauth2("bob", "state-123", "verifier-456");
        assert_eq!(session.dialect, Dialect::OAuth2);
        match session.state {
            FlowState::OAuth2 {
                csrf_state,
                pkce_verifier,
            } => {
                assert_eq!(csrf_state, "state-123");
                assert_eq!(pkce_verifier, "verifier-456");
            }
            FlowState::OAuth1 { .. } => panic!("wrong dialect state"),
        }
    }

    #[test]
    fn age_grows_from_zero() {
        let session = FlowSession::oauth2("bob", "s", "v");
        assert!(session.age() < Duration::from_secs(1));
    }

    #[test]
    fn payload_lookup_by_provider_keys() {
        let payload =
            CallbackPayload::from_pairs([("code", "abc123"), ("state", "xyz")]);
        assert_eq!(payload.get("code"), Some("abc123"));
        assert_eq!(payload.get("state"), Some("xyz"));
        assert_eq!(payload.get("oauth_verifier"), None);
    }

    #[test]
    fn payload_insert_overwrites() {
        let mut payload = CallbackPayload::new();
        payload.insert("state", "first");
        payload.insert("state", "second");
        assert_eq!(payload.get("state"), Some("second"));
    }
}
