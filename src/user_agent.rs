//! Shared User-Agent strings for catalog and audio download HTTP clients.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/playlist-dl/playlist-dl";

/// Browser identity sent to the catalog API, which rejects unknown agents.
const CATALOG_BROWSER_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Default User-Agent for audio and cover downloads (identifies the tool).
#[must_use]
pub(crate) fn default_download_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("playlist-dl/{version} (+{PROJECT_UA_URL})")
}

/// User-Agent for catalog API requests.
#[must_use]
pub(crate) fn catalog_user_agent() -> &'static str {
    CATALOG_BROWSER_UA
}
