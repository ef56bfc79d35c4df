//! Credential lifecycle orchestration
//!
//! The public entry point of the workspace: decides, per user, whether a
//! stored credential can be reused, refreshed, or must be re-established
//! through a fresh authorization flow. Works against any `CredentialStore`
//! backend and either OAuth dialect through the `ProviderClient` trait.
//!
//! Per-user lifecycle:
//! 1. `ensure_authenticated(user)` with no stored record → `NeedsRedirect`;
//!    the user visits the returned URL and authorizes
//! 2. The provider calls back; `handle_callback(user, payload)` exchanges the
//!    payload for a credential and persists it
//! 3. Later `ensure_authenticated` calls reuse the record while it is fresh
//! 4. A stale OAuth2 record is refreshed inline and the result persisted; a
//!    rejected refresh token falls back to a fresh flow
//! 5. An OAuth1 record is probed with `verify`; a rejected credential is
//!    dropped and the flow restarted
//!
//! Abandoned flows (started but never completed) are kept until the caller
//! decides otherwise; `purge_stale_sessions` is the garbage-collection hook.

pub mod orchestrator;

pub use orchestrator::{AuthOutcome, Orchestrator};
