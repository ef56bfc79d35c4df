//! CSRF state and PKCE (RFC 7636) generation
//!
//! Produces the opaque values that bind an OAuth2 authorization request to
//! its callback: the `state` parameter the provider round-trips unchanged
//! (checked with exact equality at callback time), and the PKCE verifier /
//! S256 challenge pair proving the token exchange comes from the party that
//! started the flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Generate the CSRF `state` value for an authorization request.
///
/// 32 random bytes as URL-safe base64 (43 characters, no padding). Compared
/// with exact equality against the callback's `state`; never skipped.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a cryptographically random PKCE code verifier.
///
/// 64 random bytes as URL-safe base64 (86 characters, no padding), within
/// the 43-128 character range RFC 7636 requires.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}
