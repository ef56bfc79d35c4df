//! OAuth1 token exchange and credential verification
//!
//! Handles the three provider interactions of the 1.0a dialect:
//! 1. Request-token exchange (flow start)
//! 2. Access-token exchange (verifier leg, flow completion)
//! 3. Verify-credentials probe (staleness check; 1.0a tokens carry no expiry)
//!
//! All three send a signed `Authorization: OAuth` header; the token
//! endpoints respond with form-encoded bodies rather than JSON.

use serde::Deserialize;
use tracing::debug;

use provider::{AuthError, Result};

use crate::signature;

/// Response from the request-token endpoint (form-encoded).
#[derive(Debug, Deserialize)]
pub struct RequestTokenResponse {
    pub oauth_token: String,
    pub oauth_token_secret: String,
    /// "true" when the provider accepted our callback URI.
    #[serde(default)]
    pub oauth_callback_confirmed: Option<String>,
}

/// Response from the access-token endpoint (form-encoded).
#[derive(Debug, Deserialize)]
pub struct AccessTokenResponse {
    pub oauth_token: String,
    pub oauth_token_secret: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub screen_name: Option<String>,
}

/// Exchange client identity for a short-lived request-token pair.
///
/// First leg of the three-legged flow. A 401/403 here means the consumer
/// key/secret themselves were refused — configuration, not user error.
pub async fn request_token(
    client: &reqwest::Client,
    endpoint: &str,
    consumer_key: &str,
    consumer_secret: &str,
    callback_uri: &str,
) -> Result<RequestTokenResponse> {
    let mut params = signature::protocol_params(consumer_key, None);
    params.push(("oauth_callback".to_string(), callback_uri.to_string()));
    let sig = signature::sign("POST", endpoint, &params, consumer_secret, "");
    params.push(("oauth_signature".to_string(), sig));

    let response = client
        .post(endpoint)
        .header(
            reqwest::header::AUTHORIZATION,
            signature::authorization_header(&params),
        )
        .send()
        .await
        .map_err(|e| AuthError::ProviderUnreachable(format!("request token call failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        if status.is_server_error() {
            return Err(AuthError::ProviderUnreachable(format!(
                "request token endpoint returned {status}: {body}"
            )));
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AuthError::InvalidClientCredentials(format!(
                "request token endpoint returned {status}: {body}"
            )));
        }
        return Err(AuthError::ProviderRejected(format!(
            "request token endpoint returned {status}: {body}"
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| AuthError::ProviderUnreachable(format!("reading request token response: {e}")))?;
    serde_urlencoded::from_str(&body)
        .map_err(|e| AuthError::ProviderRejected(format!("invalid request token response: {e}")))
}

/// Exchange {request-token, request-token-secret, verifier} for a permanent
/// access-token pair. Third leg of the flow.
pub async fn access_token(
    client: &reqwest::Client,
    endpoint: &str,
    consumer_key: &str,
    consumer_secret: &str,
    request_token: &str,
    request_token_secret: &str,
    verifier: &str,
) -> Result<AccessTokenResponse> {
    let mut params = signature::protocol_params(consumer_key, Some(request_token));
    params.push(("oauth_verifier".to_string(), verifier.to_string()));
    let sig = signature::sign("POST", endpoint, &params, consumer_secret, request_token_secret);
    params.push(("oauth_signature".to_string(), sig));

    let response = client
        .post(endpoint)
        .header(
            reqwest::header::AUTHORIZATION,
            signature::authorization_header(&params),
        )
        .send()
        .await
        .map_err(|e| AuthError::ProviderUnreachable(format!("access token call failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        if status.is_server_error() {
            return Err(AuthError::ProviderUnreachable(format!(
                "access token endpoint returned {status}: {body}"
            )));
        }
        // 400/401/403 mean the verifier or request token was wrong or expired
        return Err(AuthError::InvalidVerifier(format!(
            "access token endpoint returned {status}: {body}"
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| AuthError::ProviderUnreachable(format!("reading access token response: {e}")))?;
    serde_urlencoded::from_str(&body)
        .map_err(|e| AuthError::ProviderRejected(format!("invalid access token response: {e}")))
}

/// Lightweight authenticated probe confirming the token pair still works.
///
/// `Ok(false)` means the provider explicitly rejected the credential;
/// transport failures and 5xx surface as errors so the caller doesn't
/// mistake an outage for a revoked token.
pub async fn verify_credentials(
    client: &reqwest::Client,
    endpoint: &str,
    consumer_key: &str,
    consumer_secret: &str,
    token: &str,
    token_secret: &str,
) -> Result<bool> {
    let mut params = signature::protocol_params(consumer_key, Some(token));
    let sig = signature::sign("GET", endpoint, &params, consumer_secret, token_secret);
    params.push(("oauth_signature".to_string(), sig));

    let response = client
        .get(endpoint)
        .header(
            reqwest::header::AUTHORIZATION,
            signature::authorization_header(&params),
        )
        .send()
        .await
        .map_err(|e| AuthError::ProviderUnreachable(format!("verify call failed: {e}")))?;

    let status = response.status();
    if status.is_success() {
        debug!("credential verify succeeded");
        return Ok(true);
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        debug!(%status, "credential verify rejected");
        return Ok(false);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    if status.is_server_error() {
        return Err(AuthError::ProviderUnreachable(format!(
            "verify endpoint returned {status}: {body}"
        )));
    }
    Err(AuthError::ProviderRejected(format!(
        "verify endpoint returned {status}: {body}"
    )))
}
