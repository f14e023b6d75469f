//! Cookie file loading for authenticated catalog access.
//!
//! The file is plain text. Blank lines and lines starting with `//` are
//! dropped; the remaining lines are trimmed and concatenated into a single
//! `k=v; k2=v2` cookie header.

use std::path::Path;
use std::sync::Arc;

use reqwest::cookie::Jar;
use tracing::{info, warn};
use url::Url;

use super::CatalogError;

/// Reads a cookie file into a cookie header value.
///
/// Returns `Ok(None)` when the file does not exist (logged as a warning) or
/// holds no cookie lines.
///
/// # Errors
///
/// Returns [`CatalogError::CookieFile`] if the file exists but cannot be read.
pub fn load_cookie_file(path: &Path) -> Result<Option<String>, CatalogError> {
    if !path.exists() {
        warn!(path = %path.display(), "cookie file not found, continuing without cookies");
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::CookieFile {
        path: path.to_path_buf(),
        source,
    })?;

    let header = parse_cookie_text(&content);
    if header.is_empty() {
        warn!(path = %path.display(), "cookie file has no cookie lines");
        return Ok(None);
    }

    info!(path = %path.display(), "using cookie file");
    Ok(Some(header))
}

/// Drops comment and blank lines and concatenates the rest.
fn parse_cookie_text(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .collect()
}

/// Builds a cookie jar holding every `name=value` pair of `header` for `url`.
#[must_use]
pub fn cookie_jar_for(header: &str, url: &Url) -> Arc<Jar> {
    let jar = Jar::default();
    for pair in header.split(';').map(str::trim).filter(|p| p.contains('=')) {
        jar.add_cookie_str(pair, url);
    }
    Arc::new(jar)
}
