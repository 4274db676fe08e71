use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Canonical `scheme://host[:port]path[?query]` form of an http(s) URL.
///
/// Only ever used as an equality key for deduplication; the raw URL is what
/// gets displayed and reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a raw URL for duplicate detection.
///
/// Scheme and host are lower-cased, default ports dropped, trailing slashes
/// trimmed (the root path stays `/`) and the query string kept. Fragments are
/// discarded. Anything that is not an http(s) URL is rejected.
pub fn normalize(raw: &str) -> Result<NormalizedUrl> {
    let trimmed = raw.trim();
    let parsed =
        Url::parse(trimmed).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", trimmed, e)))?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ScanError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            trimmed, scheme
        )));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| ScanError::InvalidUrl(format!("{}: missing host", trimmed)))?
        .to_ascii_lowercase();

    // `Url` already drops the port when it is the scheme default
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    let path = match parsed.path().trim_end_matches('/') {
        "" => "/",
        p => p,
    };

    let mut normalized = format!("{}://{}{}{}", scheme, host, port, path);
    if let Some(query) = parsed.query().filter(|q| !q.is_empty()) {
        normalized.push('?');
        normalized.push_str(query);
    }

    Ok(NormalizedUrl(normalized))
}

/// `scheme://host[:port]` of a URL, the key used for per-site data.
pub fn site_root(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?;
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    Some(format!("{}://{}{}", parsed.scheme(), host, port))
}
