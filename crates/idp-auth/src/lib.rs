//! Identity-provider OAuth wire library
//!
//! Implements both OAuth dialects against one configured identity provider,
//! plus the durable credential store. This crate is a standalone library with
//! no dependency on any HTTP serving layer — it can be tested and used
//! independently.
//!
//! Credential flow:
//! 1. Orchestrator calls `begin_flow()` on an [`OAuth1Client`] or
//!    [`OAuth2Client`] and holds the returned session
//! 2. User authorizes via the returned redirect URL
//! 3. Orchestrator calls `complete_flow()` with the provider's callback
//!    payload
//! 4. Resulting record stored via a [`CredentialStore`] backend
//! 5. Stale OAuth2 records go through `refresh()`; OAuth1 records through
//!    `verify()`
//! 6. Updated records saved back through the same store

pub mod client;
pub mod config;
pub mod constants;
pub mod oauth1;
pub mod oauth2;
pub mod pkce;
pub mod signature;
pub mod store;

pub use client::{OAuth1Client, OAuth2Client};
pub use config::{Endpoints, ProviderConfig};
pub use store::{CredentialStore, FileStore, MemoryStore};
