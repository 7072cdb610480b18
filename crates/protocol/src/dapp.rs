//! dApp URL helpers: identity keys, domain extraction, and domain checks.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use url::Url;

/// Stable storage key for a dApp URL.
///
/// URL-safe base64 (no padding) of SHA-256 over the trimmed, lowercased URL,
/// so `"HTTPS://App.com "` and `"https://app.com"` share one key.
pub fn extension_key(url: &str) -> String {
    let normalized = url.trim().to_lowercase();
    URL_SAFE_NO_PAD.encode(Sha256::digest(normalized.as_bytes()))
}

/// Strips a single trailing slash.
pub fn trim_trailing_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}

/// Whether `candidate` belongs to the app registered at `app_url`.
///
/// Both sides are compared without a trailing slash; a page URL matches when
/// it starts with the registered app URL, so sub-paths of a root-registered
/// dApp resolve to the same app.
pub fn url_matches_app(candidate: &str, app_url: &str) -> bool {
    trim_trailing_slash(candidate).starts_with(trim_trailing_slash(app_url))
}

/// Host part of a URL, lowercased, without scheme, port, or path.
///
/// Falls back to manual stripping for inputs the URL parser rejects (such as
/// a bare `example.com/path`).
pub fn extract_domain(url: &str) -> String {
    if let Some(host) = Url::parse(url.trim()).ok().and_then(|u| u.host_str().map(str::to_lowercase)) {
        return host;
    }

    let rest = url.trim();
    let rest = rest.split_once("://").map_or(rest, |(_, r)| r);
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    let host = host.split(':').next().unwrap_or_default();
    host.to_lowercase()
}

/// Whether `domain` looks like a public dApp domain: non-empty and containing
/// a dot that is neither its first nor its last character.
pub fn is_valid_dapp_domain(domain: &str) -> bool {
    let bytes = domain.as_bytes();
    if bytes.len() < 3 {
        return false;
    }
    bytes[1..bytes.len() - 1].contains(&b'.')
        && bytes[0] != b'.'
        && bytes[bytes.len() - 1] != b'.'
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
