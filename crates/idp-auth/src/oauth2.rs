//! OAuth2 authorization URL, code exchange, and refresh
//!
//! The token endpoint serves both interactions with different grant types:
//! 1. Authorization code exchange (flow completion, with the PKCE verifier)
//! 2. Token refresh (lazy, when a stored record has gone stale)
//!
//! `expires_in` comes back as a delta in seconds; the caller converts it to
//! an absolute unix-millisecond timestamp when building the record. A
//! refresh response may omit `refresh_token`; the caller keeps the previous
//! one in that case, never discarding it on a mere omission.

use serde::Deserialize;

use provider::{AuthError, Result};

/// Response from the token endpoint for both exchange and refresh.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Absent on some refresh responses; the previous token stays valid.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute).
    pub expires_in: u64,
    /// Space-delimited granted scopes, when the provider reports them.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Build the authorization URL the end user must visit.
///
/// Carries the CSRF `state`, the PKCE S256 challenge, and the requested
/// scopes. The provider round-trips `state` unchanged in its callback.
pub fn build_authorization_url(
    authorize_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
    challenge: &str,
) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
        authorize_endpoint,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes.join(" ")),
        state,
        challenge,
    )
}

/// Exchange an authorization code for tokens (flow completion).
///
/// Sends the PKCE verifier to prove we initiated the flow. A 400/401 means
/// the code (or verifier) was wrong or expired; 403 means the client
/// identity itself was refused.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_endpoint)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await
        .map_err(|e| AuthError::ProviderUnreachable(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        if status.is_server_error() {
            return Err(AuthError::ProviderUnreachable(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        if status.as_u16() == 403 {
            return Err(AuthError::InvalidClientCredentials(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        if status.as_u16() == 400 || status.as_u16() == 401 {
            return Err(AuthError::InvalidVerifier(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        return Err(AuthError::ProviderRejected(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| AuthError::ProviderRejected(format!("invalid token response: {e}")))
}

/// Refresh an access token using a refresh token.
///
/// Called lazily when a protected operation finds the stored record stale.
/// 400/401/403 all mean the refresh token itself was rejected; the caller
/// falls back to a full re-authentication.
pub async fn refresh_token(
    client: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    client_secret: &str,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_endpoint)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ])
        .send()
        .await
        .map_err(|e| AuthError::ProviderUnreachable(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        if status.is_server_error() {
            return Err(AuthError::ProviderUnreachable(format!(
                "token refresh returned {status}: {body}"
            )));
        }
        // invalid_grant and friends: the refresh token is dead
        return Err(AuthError::RefreshTokenInvalid(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| AuthError::ProviderRejected(format!("invalid refresh response: {e}")))
}
