//! Default provider endpoints
//!
//! The reference deployment targets Twitter's API; these URLs identify
//! public endpoints, not secrets. Every one of them can be overridden in
//! [`crate::config::ProviderConfig`], so the library stays usable against
//! any single provider speaking either dialect.

/// OAuth2 authorization endpoint (user-facing consent page)
pub const OAUTH2_AUTHORIZE_ENDPOINT: &str = "https://api.twitter.com/oauth2/authorize";

/// OAuth2 token endpoint, used for both code exchange and refresh
pub const OAUTH2_TOKEN_ENDPOINT: &str = "https://api.twitter.com/oauth2/token";

/// OAuth1 request-token endpoint (first leg of the three-legged flow)
pub const OAUTH1_REQUEST_TOKEN_ENDPOINT: &str = "https://api.twitter.com/oauth/request_token";

/// OAuth1 authorization endpoint (user-facing consent page)
pub const OAUTH1_AUTHORIZE_ENDPOINT: &str = "https://api.twitter.com/oauth/authorize";

/// OAuth1 access-token endpoint (verifier exchange, third leg)
pub const OAUTH1_ACCESS_TOKEN_ENDPOINT: &str = "https://api.twitter.com/oauth/access_token";

/// Lightweight authenticated call confirming an OAuth1 credential still
/// works. OAuth1 tokens carry no expiry, so this is the only staleness probe.
pub const OAUTH1_VERIFY_ENDPOINT: &str =
    "https://api.twitter.com/1.1/account/verify_credentials.json";

/// Default OAuth2 scopes requested when the config names none.
pub const DEFAULT_SCOPES: &[&str] = &["tweet.read", "users.read"];
