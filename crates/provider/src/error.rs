//! Failure taxonomy for credential lifecycle operations
//!
//! One enum shared by the wire clients, the credential store, and the
//! orchestrator. Every failure kind stays distinguishable to the caller;
//! nothing is collapsed into a generic message string. The orchestrator is
//! the only layer that applies policy to these (e.g. `RefreshTokenInvalid`
//! becomes a fresh `begin_flow`), and it does so by matching variants, never
//! by re-wrapping.

/// Errors from flow, refresh, verify, and store operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Network failure or provider 5xx. The whole flow may be retried.
    #[error("provider unreachable: {0}")]
    ProviderUnreachable(String),

    /// Provider refused our client identity. Misconfiguration; not retryable.
    #[error("invalid client credentials: {0}")]
    InvalidClientCredentials(String),

    /// Wrong or expired verifier/authorization code. Restart the flow.
    #[error("invalid verifier: {0}")]
    InvalidVerifier(String),

    /// Callback `state` did not exactly match the stored CSRF state.
    #[error("callback state does not match the pending flow")]
    CsrfMismatch,

    /// Provider returned a non-success the other variants don't cover.
    #[error("provider rejected the request: {0}")]
    ProviderRejected(String),

    /// Provider rejected the refresh token itself. Fall back to a full
    /// re-authentication rather than failing hard.
    #[error("refresh token rejected: {0}")]
    RefreshTokenInvalid(String),

    /// Callback arrived with no pending flow for that user.
    #[error("no pending authentication flow for {0}")]
    NoPendingFlow(String),

    /// Credential store read/write failure. Fatal for the operation.
    #[error("credential store I/O failure: {0}")]
    Io(String),

    /// Store delete for a username with no record.
    #[error("no credential record for {0}")]
    NotFound(String),

    /// Guard against persisting a partially populated record.
    #[error("refusing to persist partial credential record: {0}")]
    InvalidRecord(String),

    /// Operation has no meaning for this dialect (OAuth1 refresh).
    #[error("not supported: {0}")]
    NotSupported(&'static str),
}

/// Result alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, AuthError>;
