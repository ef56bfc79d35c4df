//! Provider configuration and loading
//!
//! One provider per deployment; the dialect picks which endpoints must be
//! present. The client secret is loaded from the `OAUTH_CLIENT_SECRET` env
//! var or a secret file, never from the TOML directly, to avoid leaking
//! credentials through config management.

use std::path::{Path, PathBuf};

use common::Secret;
use provider::Dialect;
use serde::Deserialize;

use crate::constants;

/// Environment variable consulted first for the client secret.
const CLIENT_SECRET_ENV: &str = "OAUTH_CLIENT_SECRET";

/// Root provider configuration.
///
/// ```toml
/// dialect = "oauth2"
/// client_id = "xvz1evFS4wEEPTGEFPHBog"
/// client_secret_file = "/run/secrets/oauth-client-secret"
/// redirect_uri = "https://gateway.example/callback"
/// scopes = ["tweet.read", "users.read"]
///
/// [endpoints]
/// authorize = "https://api.twitter.com/oauth2/authorize"
/// token = "https://api.twitter.com/oauth2/token"
/// ```
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    pub dialect: Dialect,
    /// OAuth2 client ID / OAuth1 consumer key.
    pub client_id: String,
    /// OAuth2 client secret / OAuth1 consumer secret. Resolved from env or
    /// `client_secret_file`, never deserialized.
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to the
    /// `OAUTH_CLIENT_SECRET` env var).
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    /// Where the provider redirects the user after authorization.
    pub redirect_uri: String,
    /// Requested OAuth2 scopes; must be empty for OAuth1.
    #[serde(default)]
    pub scopes: Vec<String>,
    pub endpoints: Endpoints,
}

/// Provider endpoint URLs. Which fields are required depends on the dialect.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoints {
    /// User-facing authorization page (both dialects).
    pub authorize: String,
    /// OAuth2 token endpoint (code exchange and refresh).
    #[serde(default)]
    pub token: Option<String>,
    /// OAuth1 request-token endpoint.
    #[serde(default)]
    pub request_token: Option<String>,
    /// OAuth1 access-token endpoint.
    #[serde(default)]
    pub access_token: Option<String>,
    /// OAuth1 verify-credentials endpoint.
    #[serde(default)]
    pub verify: Option<String>,
}

impl Endpoints {
    /// Default OAuth2 endpoints for the reference provider.
    pub fn default_oauth2() -> Self {
        Self {
            authorize: constants::OAUTH2_AUTHORIZE_ENDPOINT.into(),
            token: Some(constants::OAUTH2_TOKEN_ENDPOINT.into()),
            request_token: None,
            access_token: None,
            verify: None,
        }
    }

    /// Default OAuth1 endpoints for the reference provider.
    pub fn default_oauth1() -> Self {
        Self {
            authorize: constants::OAUTH1_AUTHORIZE_ENDPOINT.into(),
            token: None,
            request_token: Some(constants::OAUTH1_REQUEST_TOKEN_ENDPOINT.into()),
            access_token: Some(constants::OAUTH1_ACCESS_TOKEN_ENDPOINT.into()),
            verify: Some(constants::OAUTH1_VERIFY_ENDPOINT.into()),
        }
    }
}

impl ProviderConfig {
    /// Load configuration from a TOML file, then resolve the client secret.
    ///
    /// Secret resolution order:
    /// 1. `OAUTH_CLIENT_SECRET` env var
    /// 2. `client_secret_file` path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: ProviderConfig = toml::from_str(&contents)?;

        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            config.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.client_secret_file {
            let secret = std::fs::read_to_string(secret_file)?;
            config.client_secret = Some(Secret::new(secret.trim().to_string()));
        } else {
            return Err(common::Error::Config(format!(
                "client secret not provided; set {CLIENT_SECRET_ENV} or client_secret_file"
            )));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate field presence and shape for the configured dialect.
    pub fn validate(&self) -> common::Result<()> {
        if self.client_id.is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }

        require_http_url("redirect_uri", &self.redirect_uri)?;
        require_http_url("endpoints.authorize", &self.endpoints.authorize)?;

        match self.dialect {
            Dialect::OAuth2 => {
                let token = self.endpoints.token.as_deref().ok_or_else(|| {
                    common::Error::Config("oauth2 requires endpoints.token".into())
                })?;
                require_http_url("endpoints.token", token)?;
            }
            Dialect::OAuth1 => {
                for (name, value) in [
                    ("endpoints.request_token", &self.endpoints.request_token),
                    ("endpoints.access_token", &self.endpoints.access_token),
                    ("endpoints.verify", &self.endpoints.verify),
                ] {
                    let url = value.as_deref().ok_or_else(|| {
                        common::Error::Config(format!("oauth1 requires {name}"))
                    })?;
                    require_http_url(name, url)?;
                }
                if !self.scopes.is_empty() {
                    return Err(common::Error::Config(
                        "scopes are oauth2-only; oauth1 grants are unscoped".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Scopes to request, falling back to the provider defaults for OAuth2.
    pub fn effective_scopes(&self) -> Vec<String> {
        match self.dialect {
            Dialect::OAuth1 => Vec::new(),
            Dialect::OAuth2 if self.scopes.is_empty() => constants::DEFAULT_SCOPES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            Dialect::OAuth2 => self.scopes.clone(),
        }
    }

    /// The resolved client secret, empty when none was loaded. Validated
    /// configs loaded through [`ProviderConfig::load`] always carry one.
    pub fn client_secret_value(&self) -> &str {
        self.client_secret
            .as_ref()
            .map_or("", |secret| secret.expose().as_str())
    }
}

fn require_http_url(name: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {value}"
        )))
    }
}
