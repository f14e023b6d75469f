//! Catalog resolution: from a user reference to an ordered track list with play URLs.
//!
//! # Architecture
//!
//! - [`parse_reference`] - detects the reference kind and extracts the numeric id
//! - [`CatalogService`] - async trait over the remote catalog API
//! - [`NeteaseClient`] - HTTP implementation of [`CatalogService`]
//! - [`CatalogResolver`] - kind dispatch, batched track/URL fetching, caching
//! - [`CatalogCache`] - per-run memoization of resolved items
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use playlist_dl_core::catalog::{CatalogCache, CatalogResolver, NeteaseClient, Quality};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = NeteaseClient::new(None)?;
//! let resolver = CatalogResolver::new(Arc::new(client), Arc::new(CatalogCache::new()));
//!
//! let catalog = resolver.resolve("https://music.163.com/#/playlist?id=123456").await?;
//! let urls = resolver.resolve_play_urls(&catalog.track_ids(), Quality::Max).await;
//! println!("{}: {} tracks, {} urls", catalog.title, catalog.tracks.len(), urls.len());
//! # Ok(())
//! # }
//! ```

mod cache;
mod cookies;
mod error;
mod model;
mod netease;
mod reference;
mod resolver;

pub use cache::CatalogCache;
pub use cookies::{cookie_jar_for, load_cookie_file};
pub use error::{CatalogError, MalformedMetadata};
pub use model::{
    AlbumRef, Artist, CatalogItem, PlayUrlInfo, ProgramEpisode, Quality, SourceKind, Track,
};
pub use netease::{DEFAULT_API_BASE_URL, NeteaseClient, NeteaseOptions};
pub use reference::{SourceRef, detect_kind, extract_id, parse_reference};
pub use resolver::{
    CatalogResolver, DEFAULT_BATCH_DELAY, PLAY_URL_BATCH_SIZE, TRACK_DETAIL_BATCH_SIZE,
};

use async_trait::async_trait;

/// Successfully decoded entries of a batch plus the entries that were skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T> {
    pub items: Vec<T>,
    pub malformed: Vec<MalformedMetadata>,
}

impl<T> Decoded<T> {
    /// Creates a batch with no malformed entries.
    #[must_use]
    pub fn ok(items: Vec<T>) -> Self {
        Self {
            items,
            malformed: Vec::new(),
        }
    }
}

impl<T> Default for Decoded<T> {
    fn default() -> Self {
        Self::ok(Vec::new())
    }
}

/// One metadata response for a playlist, album or program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPage {
    /// Display fields plus the embedded (possibly partial) track page.
    pub item: CatalogItem,
    /// Complete ordered id list, when the catalog returns one separately.
    pub track_ids: Option<Vec<u64>>,
    /// Embedded track entries that could not be decoded.
    pub malformed: Vec<MalformedMetadata>,
}

/// Remote catalog operations.
///
/// `Ok(None)` means the catalog answered but has no such item. Transport and
/// decoding failures are returned as errors; the resolver turns them into
/// missing data.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Fetches playlist metadata, its embedded tracks and its complete id list.
    async fn playlist(&self, id: u64) -> Result<Option<CatalogPage>, CatalogError>;

    /// Fetches album metadata and tracks.
    async fn album(&self, id: u64) -> Result<Option<CatalogPage>, CatalogError>;

    /// Fetches program-collection metadata.
    async fn program_collection(&self, id: u64) -> Result<Option<CatalogPage>, CatalogError>;

    /// Resolves play URLs for one batch of track ids.
    async fn play_urls(
        &self,
        ids: &[u64],
        quality: Quality,
    ) -> Result<Decoded<PlayUrlInfo>, CatalogError>;

    /// Fetches full track metadata for one batch of ids.
    async fn tracks_by_ids(&self, ids: &[u64]) -> Result<Decoded<Track>, CatalogError>;
}
