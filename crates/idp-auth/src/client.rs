//! Provider client implementations over the wire helpers
//!
//! Binds the configured endpoints, client identity, and HTTP client into the
//! two `ProviderClient` implementations the orchestrator drives. Each client
//! speaks one dialect; a deployment constructs the one matching its
//! configuration and hands it over as `Arc<dyn ProviderClient>`.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use common::Secret;
use provider::{
    AuthError, CallbackPayload, CredentialRecord, Dialect, FlowSession, FlowStart, FlowState,
    ProviderClient, Result,
};

use crate::config::ProviderConfig;
use crate::{oauth1, oauth2, pkce, signature};

/// Current unix time in milliseconds, for absolute expiry timestamps.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Split a space-delimited `scope` field into a scope set.
fn parse_scopes(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// Pull the loaded client secret out of a config, refusing an empty one.
fn require_secret(config: &ProviderConfig) -> common::Result<Secret<String>> {
    config
        .client_secret
        .clone()
        .filter(|secret| !secret.expose().is_empty())
        .ok_or_else(|| common::Error::Config("client secret is not loaded".into()))
}

/// Three-legged OAuth1.0a client.
///
/// Tokens produced by this client are long-lived and carry no expiry;
/// staleness is detected through `verify`, and `refresh` is not supported.
#[derive(Debug)]
pub struct OAuth1Client {
    consumer_key: String,
    consumer_secret: Secret<String>,
    callback_uri: String,
    request_token_endpoint: String,
    authorize_endpoint: String,
    access_token_endpoint: String,
    verify_endpoint: String,
    http: reqwest::Client,
}

impl OAuth1Client {
    /// Build a client from a validated OAuth1 configuration.
    pub fn new(config: &ProviderConfig, http: reqwest::Client) -> common::Result<Self> {
        config.validate()?;
        if config.dialect != Dialect::OAuth1 {
            return Err(common::Error::Config(
                "OAuth1Client requires dialect = \"oauth1\"".into(),
            ));
        }
        let endpoint = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| common::Error::Config(format!("oauth1 requires {name}")))
        };
        Ok(Self {
            consumer_key: config.client_id.clone(),
            consumer_secret: require_secret(config)?,
            callback_uri: config.redirect_uri.clone(),
            request_token_endpoint: endpoint(
                &config.endpoints.request_token,
                "endpoints.request_token",
            )?,
            authorize_endpoint: config.endpoints.authorize.clone(),
            access_token_endpoint: endpoint(
                &config.endpoints.access_token,
                "endpoints.access_token",
            )?,
            verify_endpoint: endpoint(&config.endpoints.verify, "endpoints.verify")?,
            http,
        })
    }
}

impl ProviderClient for OAuth1Client {
    fn dialect(&self) -> Dialect {
        Dialect::OAuth1
    }

    fn begin_flow<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<FlowStart>> + Send + 'a>> {
        Box::pin(async move {
            let response = oauth1::request_token(
                &self.http,
                &self.request_token_endpoint,
                &self.consumer_key,
                self.consumer_secret.expose(),
                &self.callback_uri,
            )
            .await?;

            let redirect_url = format!(
                "{}?oauth_token={}",
                self.authorize_endpoint,
                signature::percent_encode(&response.oauth_token)
            );
            info!(username, "oauth1 flow started");
            Ok(FlowStart {
                redirect_url,
                session: FlowSession::oauth1(
                    username,
                    response.oauth_token,
                    response.oauth_token_secret,
                ),
            })
        })
    }

    fn complete_flow<'a>(
        &'a self,
        session: FlowSession,
        payload: &'a CallbackPayload,
    ) -> Pin<Box<dyn Future<Output = Result<CredentialRecord>> + Send + 'a>> {
        Box::pin(async move {
            let FlowSession {
                username, state, ..
            } = session;
            let FlowState::OAuth1 {
                request_token,
                request_token_secret,
            } = state
            else {
                return Err(AuthError::NotSupported(
                    "oauth1 client handed an oauth2 flow session",
                ));
            };

            // The callback echoes the request token; anything else means the
            // link is stale or forged.
            if let Some(token) = payload.get("oauth_token") {
                if token != request_token {
                    warn!(username, "callback request token does not match session");
                    return Err(AuthError::InvalidVerifier(
                        "callback oauth_token does not match the pending request token".into(),
                    ));
                }
            }
            let verifier = payload.get("oauth_verifier").ok_or_else(|| {
                AuthError::InvalidVerifier("callback missing oauth_verifier".into())
            })?;

            let response = oauth1::access_token(
                &self.http,
                &self.access_token_endpoint,
                &self.consumer_key,
                self.consumer_secret.expose(),
                &request_token,
                &request_token_secret,
                verifier,
            )
            .await?;

            info!(username, "oauth1 flow completed");
            Ok(CredentialRecord {
                username,
                dialect: Dialect::OAuth1,
                primary_secret: response.oauth_token,
                secondary_secret: response.oauth_token_secret,
                expires_at: None,
                scopes: BTreeSet::new(),
            })
        })
    }

    fn refresh<'a>(
        &'a self,
        _record: &'a CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = Result<CredentialRecord>> + Send + 'a>> {
        Box::pin(async move {
            Err(AuthError::NotSupported(
                "oauth1 tokens are long-lived and have no refresh exchange",
            ))
        })
    }

    fn verify<'a>(
        &'a self,
        record: &'a CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            if record.dialect != Dialect::OAuth1 {
                return Err(AuthError::NotSupported(
                    "oauth1 client cannot verify an oauth2 record",
                ));
            }
            oauth1::verify_credentials(
                &self.http,
                &self.verify_endpoint,
                &self.consumer_key,
                self.consumer_secret.expose(),
                &record.primary_secret,
                &record.secondary_secret,
            )
            .await
        })
    }
}

/// OAuth2 authorization-code client with refresh.
///
/// `begin_flow` is purely local (CSRF state, PKCE pair, URL assembly); the
/// provider is first contacted at `complete_flow`. Records carry an absolute
/// expiry, so staleness is a local clock check and `verify` is not supported.
#[derive(Debug)]
pub struct OAuth2Client {
    client_id: String,
    client_secret: Secret<String>,
    redirect_uri: String,
    scopes: Vec<String>,
    authorize_endpoint: String,
    token_endpoint: String,
    http: reqwest::Client,
}

impl OAuth2Client {
    /// Build a client from a validated OAuth2 configuration.
    pub fn new(config: &ProviderConfig, http: reqwest::Client) -> common::Result<Self> {
        config.validate()?;
        if config.dialect != Dialect::OAuth2 {
            return Err(common::Error::Config(
                "OAuth2Client requires dialect = \"oauth2\"".into(),
            ));
        }
        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: require_secret(config)?,
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.effective_scopes(),
            authorize_endpoint: config.endpoints.authorize.clone(),
            token_endpoint: config
                .endpoints
                .token
                .clone()
                .ok_or_else(|| common::Error::Config("oauth2 requires endpoints.token".into()))?,
            http,
        })
    }

    /// Build a record from a token response, filling omitted fields from the
    /// values the flow already holds.
    fn record_from_token(
        &self,
        username: String,
        token: oauth2::TokenResponse,
        fallback_refresh: Option<String>,
        fallback_scopes: BTreeSet<String>,
    ) -> Result<CredentialRecord> {
        let secondary_secret = match token.refresh_token.or(fallback_refresh) {
            Some(refresh) => refresh,
            None => {
                return Err(AuthError::ProviderRejected(
                    "token response carried no refresh token".into(),
                ));
            }
        };
        let scopes = match token.scope.as_deref() {
            Some(scope) => parse_scopes(scope),
            None => fallback_scopes,
        };
        Ok(CredentialRecord {
            username,
            dialect: Dialect::OAuth2,
            primary_secret: token.access_token,
            secondary_secret,
            expires_at: Some(now_millis() + token.expires_in * 1000),
            scopes,
        })
    }
}

impl ProviderClient for OAuth2Client {
    fn dialect(&self) -> Dialect {
        Dialect::OAuth2
    }

    fn begin_flow<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<FlowStart>> + Send + 'a>> {
        Box::pin(async move {
            let state = pkce::generate_state();
            let verifier = pkce::generate_verifier();
            let challenge = pkce::compute_challenge(&verifier);
            let redirect_url = oauth2::build_authorization_url(
                &self.authorize_endpoint,
                &self.client_id,
                &self.redirect_uri,
                &self.scopes,
                &state,
                &challenge,
            );
            info!(username, "oauth2 flow started");
            Ok(FlowStart {
                redirect_url,
                session: FlowSession::oauth2(username, state, verifier),
            })
        })
    }

    fn complete_flow<'a>(
        &'a self,
        session: FlowSession,
        payload: &'a CallbackPayload,
    ) -> Pin<Box<dyn Future<Output = Result<CredentialRecord>> + Send + 'a>> {
        Box::pin(async move {
            let FlowSession {
                username, state, ..
            } = session;
            let FlowState::OAuth2 {
                csrf_state,
                pkce_verifier,
            } = state
            else {
                return Err(AuthError::NotSupported(
                    "oauth2 client handed an oauth1 flow session",
                ));
            };

            // Exact-match CSRF check before anything touches the network.
            match payload.get("state") {
                Some(returned) if returned == csrf_state => {}
                _ => {
                    warn!(username, "callback state mismatch");
                    return Err(AuthError::CsrfMismatch);
                }
            }
            let code = payload
                .get("code")
                .ok_or_else(|| AuthError::InvalidVerifier("callback missing code".into()))?;

            let token = oauth2::exchange_code(
                &self.http,
                &self.token_endpoint,
                &self.client_id,
                self.client_secret.expose(),
                &self.redirect_uri,
                code,
                &pkce_verifier,
            )
            .await?;

            info!(username, "oauth2 flow completed");
            let requested = self.scopes.iter().cloned().collect();
            self.record_from_token(username, token, None, requested)
        })
    }

    fn refresh<'a>(
        &'a self,
        record: &'a CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = Result<CredentialRecord>> + Send + 'a>> {
        Box::pin(async move {
            if record.dialect != Dialect::OAuth2 {
                return Err(AuthError::NotSupported(
                    "oauth2 client cannot refresh an oauth1 record",
                ));
            }
            if !record.has_refresh_secret() {
                return Err(AuthError::RefreshTokenInvalid(
                    "record holds no refresh token".into(),
                ));
            }

            let token = oauth2::refresh_token(
                &self.http,
                &self.token_endpoint,
                &self.client_id,
                self.client_secret.expose(),
                &record.secondary_secret,
            )
            .await?;

            info!(username = %record.username, "access token refreshed");
            // A response omitting refresh_token keeps the previous one alive.
            self.record_from_token(
                record.username.clone(),
                token,
                Some(record.secondary_secret.clone()),
                record.scopes.clone(),
            )
        })
    }

    fn verify<'a>(
        &'a self,
        _record: &'a CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            Err(AuthError::NotSupported(
                "oauth2 records carry an expiry; verify is the oauth1 staleness probe",
            ))
        })
    }
}
