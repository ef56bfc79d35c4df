//! OAuth1 request signing (RFC 5849)
//!
//! Builds the signature base string and HMAC-SHA1 signature every OAuth1
//! request carries, plus the `Authorization: OAuth` header that transports
//! the protocol parameters. Parameter normalization is exact: RFC 3986
//! percent-encoding of every key and value, lexicographic ordering of the
//! encoded pairs, then `METHOD&enc(url)&enc(params)`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use ring::hmac;

/// RFC 3986 percent-encoding: everything but unreserved characters
/// (ALPHA / DIGIT / `-` / `.` / `_` / `~`) is encoded.
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Random per-request nonce, URL- and header-safe.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Current unix time in seconds, for `oauth_timestamp`.
pub fn unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The `oauth_*` protocol parameters common to every signed request.
///
/// `token` is absent only for the request-token leg, where no token exists
/// yet. The caller appends request-specific parameters (`oauth_callback`,
/// `oauth_verifier`) and finally `oauth_signature`.
pub fn protocol_params(consumer_key: &str, token: Option<&str>) -> Vec<(String, String)> {
    let mut params = vec![
        ("oauth_consumer_key".to_string(), consumer_key.to_string()),
        ("oauth_nonce".to_string(), generate_nonce()),
        ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
        ("oauth_timestamp".to_string(), unix_seconds().to_string()),
        ("oauth_version".to_string(), "1.0".to_string()),
    ];
    if let Some(token) = token {
        params.push(("oauth_token".to_string(), token.to_string()));
    }
    params
}

/// Normalize parameters and assemble the signature base string.
///
/// `params` must contain every oauth_* parameter except `oauth_signature`,
/// plus any query/body parameters of the request.
pub fn signature_base_string(method: &str, url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}

/// Sign a request: HMAC-SHA1 over the base string, keyed by
/// `enc(consumer_secret)&enc(token_secret)`, base64-encoded.
///
/// `token_secret` is empty for the request-token leg.
pub fn sign(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: &str,
) -> String {
    let base = signature_base_string(method, url, params);
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    hmac_sha1_base64(&key, &base)
}

/// HMAC-SHA1 of `data` keyed by `key`, base64 (standard alphabet, padded).
pub fn hmac_sha1_base64(key: &str, data: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key.as_bytes());
    let tag = hmac::sign(&key, data.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(tag.as_ref())
}

/// Render the `Authorization: OAuth ...` header from signed parameters.
///
/// Only `oauth_*` parameters belong in the header; request parameters stay
/// in the query string or body.
pub fn authorization_header(params: &[(String, String)]) -> String {
    let fields = params
        .iter()
        .filter(|(k, _)| k.starts_with("oauth_"))
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {fields}")
}
