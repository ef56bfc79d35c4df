//! Provider abstraction for OAuth credential flows
//!
//! Defines the `ProviderClient` trait that decouples lifecycle orchestration
//! from the OAuth dialect spoken on the wire. Two implementations live in the
//! `idp-auth` crate: `OAuth1Client` (three-legged 1.0a) and `OAuth2Client`
//! (authorization code + refresh). The orchestrator only ever sees this trait,
//! so policy (reuse, refresh, restart) stays independent of protocol detail.
//!
//! Flow shape, both dialects:
//! 1. `begin_flow(username)` → authorization URL + an ephemeral [`FlowSession`]
//! 2. User authorizes in a browser; the provider redirects back
//! 3. `complete_flow(session, payload)` → durable [`CredentialRecord`]
//! 4. Later, `refresh` (OAuth2) or `verify` (OAuth1) keeps the record usable

mod error;
mod record;
mod session;

pub use error::{AuthError, Result};
pub use record::{CredentialRecord, Dialect};
pub use session::{CallbackPayload, FlowSession, FlowState};

use std::future::Future;
use std::pin::Pin;

/// Outcome of `begin_flow`: where to send the user, and the state to hold
/// until the provider calls back.
pub struct FlowStart {
    /// Provider authorization URL the end user must visit.
    pub redirect_url: String,
    /// Ephemeral flow state; the orchestrator owns its lifetime.
    pub session: FlowSession,
}

/// Abstraction over the two OAuth dialects.
///
/// Implementations are stateless between calls: each call is handed the
/// current session or record and returns an updated value or a typed failure.
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn ProviderClient>`).
pub trait ProviderClient: Send + Sync {
    /// Which dialect this client speaks (matches the records it produces).
    fn dialect(&self) -> Dialect;

    /// Start a fresh authorization attempt for `username`.
    ///
    /// Fails with `ProviderUnreachable` (network/5xx) or
    /// `InvalidClientCredentials` (provider refused our client identity).
    fn begin_flow<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<FlowStart>> + Send + 'a>>;

    /// Complete a pending flow with the provider's callback payload.
    ///
    /// Consumes the session by value: whatever the outcome, the session is
    /// gone and a failed attempt restarts from `begin_flow`. Fails with
    /// `InvalidVerifier`, `CsrfMismatch`, or `ProviderRejected`.
    fn complete_flow<'a>(
        &'a self,
        session: FlowSession,
        payload: &'a CallbackPayload,
    ) -> Pin<Box<dyn Future<Output = Result<CredentialRecord>> + Send + 'a>>;

    /// Exchange the record's refresh secret for a fresh credential.
    ///
    /// OAuth2 only; the OAuth1 client fails with `NotSupported` (its tokens
    /// are long-lived). Fails with `RefreshTokenInvalid` when the provider
    /// rejects the refresh token, which callers must treat as "restart from
    /// `begin_flow`", not as a terminal failure.
    fn refresh<'a>(
        &'a self,
        record: &'a CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = Result<CredentialRecord>> + Send + 'a>>;

    /// Confirm the credential still works with a lightweight authenticated
    /// call. Used when `expires_at` is absent (OAuth1) instead of trusting a
    /// local clock. `Ok(false)` means the provider rejected the credential.
    fn verify<'a>(
        &'a self,
        record: &'a CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;
}
