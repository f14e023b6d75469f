//! Kind dispatch, batched track and play-URL fetching, and caching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::{
    CatalogCache, CatalogError, CatalogItem, CatalogPage, CatalogService, MalformedMetadata,
    PlayUrlInfo, Quality, SourceKind, SourceRef, Track, parse_reference,
};

/// Track ids per play-URL call.
pub const PLAY_URL_BATCH_SIZE: usize = 200;

/// Track ids per metadata refetch call.
pub const TRACK_DETAIL_BATCH_SIZE: usize = 1000;

/// Pause between consecutive batch calls.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Resolves references into ordered catalog items and play URLs.
///
/// Service failures never cross this boundary as errors: a failed metadata
/// call yields an empty item, a failed batch yields missing entries. Only
/// reference parsing can fail.
pub struct CatalogResolver {
    service: Arc<dyn CatalogService>,
    cache: Arc<CatalogCache>,
    batch_delay: Duration,
}

impl CatalogResolver {
    /// Creates a resolver over a catalog service and a run-scoped cache.
    #[must_use]
    pub fn new(service: Arc<dyn CatalogService>, cache: Arc<CatalogCache>) -> Self {
        Self {
            service,
            cache,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }

    /// Overrides the pause between batch calls.
    #[must_use]
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Returns the cache backing this resolver.
    #[must_use]
    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    /// Parses `input` and resolves it.
    ///
    /// The returned item has no tracks when the catalog could not be reached
    /// or does not know the id; callers must check `tracks.is_empty()`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnrecognizedReference`] or
    /// [`CatalogError::IdNotFound`] when the reference cannot be parsed.
    #[instrument(skip(self))]
    pub async fn resolve(&self, input: &str) -> Result<Arc<CatalogItem>, CatalogError> {
        let source = parse_reference(input)?;
        Ok(self.resolve_source(source).await)
    }

    /// Resolves an already-parsed reference, consulting the cache first.
    #[instrument(skip(self), fields(kind = %source.kind, id = source.id))]
    pub async fn resolve_source(&self, source: SourceRef) -> Arc<CatalogItem> {
        if let Some(cached) = self.cache.get(&source) {
            debug!("catalog cache hit");
            return cached;
        }

        let fetched = match source.kind {
            SourceKind::Playlist => self.service.playlist(source.id).await,
            SourceKind::Album => self.service.album(source.id).await,
            SourceKind::Program => self.service.program_collection(source.id).await,
        };

        let page = match fetched {
            Ok(Some(page)) => page,
            Ok(None) => {
                warn!("catalog has no such item");
                return Arc::new(CatalogItem::empty(source.kind, source.id));
            }
            Err(error) => {
                warn!(error = %error, "catalog metadata call failed");
                return Arc::new(CatalogItem::empty(source.kind, source.id));
            }
        };

        let item = Arc::new(self.complete_tracks(page).await);
        info!(
            title = %item.title,
            tracks = item.tracks.len(),
            "resolved catalog item"
        );
        self.cache.insert(source, Arc::clone(&item));
        item
    }

    /// Replaces the embedded track page with a full refetch when the page
    /// carries a complete id list.
    async fn complete_tracks(&self, page: CatalogPage) -> CatalogItem {
        log_malformed(&page.malformed);
        let mut item = page.item;

        let Some(ids) = page.track_ids.filter(|ids| !ids.is_empty()) else {
            return item;
        };

        debug!(
            embedded = item.tracks.len(),
            complete = ids.len(),
            "refetching tracks from complete id list"
        );
        item.tracks = self.fetch_tracks_in_order(&ids).await;
        item
    }

    /// Fetches full tracks in batches and returns them in `ids` order.
    ///
    /// Failed batches are logged and their tracks omitted.
    async fn fetch_tracks_in_order(&self, ids: &[u64]) -> Vec<Track> {
        let mut by_id: HashMap<u64, Track> = HashMap::with_capacity(ids.len());

        for (batch_index, batch) in ids.chunks(TRACK_DETAIL_BATCH_SIZE).enumerate() {
            if batch_index > 0 {
                self.pause().await;
            }
            match self.service.tracks_by_ids(batch).await {
                Ok(decoded) => {
                    log_malformed(&decoded.malformed);
                    for track in decoded.items {
                        by_id.entry(track.id).or_insert(track);
                    }
                }
                Err(error) => {
                    warn!(
                        batch = batch_index,
                        size = batch.len(),
                        error = %error,
                        "track detail batch failed, omitting its tracks"
                    );
                }
            }
        }

        ids.iter().filter_map(|id| by_id.remove(id)).collect()
    }

    /// Resolves play URLs in batches of [`PLAY_URL_BATCH_SIZE`].
    ///
    /// Ids from failed batches have no entry. Duplicate ids keep the first answer.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn resolve_play_urls(
        &self,
        ids: &[u64],
        quality: Quality,
    ) -> HashMap<u64, PlayUrlInfo> {
        let mut urls = HashMap::with_capacity(ids.len());

        for (batch_index, batch) in ids.chunks(PLAY_URL_BATCH_SIZE).enumerate() {
            if batch_index > 0 {
                self.pause().await;
            }
            match self.service.play_urls(batch, quality).await {
                Ok(decoded) => {
                    log_malformed(&decoded.malformed);
                    for info in decoded.items {
                        urls.entry(info.track_id).or_insert(info);
                    }
                }
                Err(error) => {
                    warn!(
                        batch = batch_index,
                        size = batch.len(),
                        error = %error,
                        "play url batch failed, tracks stay unresolved"
                    );
                }
            }
        }

        debug!(resolved = urls.len(), "play urls fetched");
        urls
    }

    async fn pause(&self) {
        if !self.batch_delay.is_zero() {
            tokio::time::sleep(self.batch_delay).await;
        }
    }
}

fn log_malformed(entries: &[MalformedMetadata]) {
    for entry in entries {
        warn!(entity = entry.entity, id = ?entry.id, reason = %entry.reason, "skipping malformed catalog entry");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::{AlbumRef, Decoded};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn track(id: u64) -> Track {
        Track {
            id,
            name: format!("t{id}"),
            artists: Vec::new(),
            album: AlbumRef::default(),
            duration_ms: 0,
            episode: None,
        }
    }

    #[derive(Default)]
    struct FakeService {
        playlist_calls: AtomicUsize,
        fail_playlist: bool,
        complete_ids: Option<Vec<u64>>,
        failing_detail_batch: Option<usize>,
        detail_calls: Mutex<Vec<Vec<u64>>>,
    }

    #[async_trait]
    impl CatalogService for FakeService {
        async fn playlist(&self, id: u64) -> Result<Option<CatalogPage>, CatalogError> {
            self.playlist_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_playlist {
                return Err(CatalogError::http_status("fake", 503, None));
            }
            let mut item = CatalogItem::empty(SourceKind::Playlist, id);
            item.title = "Mix".to_string();
            item.tracks = vec![track(1)];
            Ok(Some(CatalogPage {
                item,
                track_ids: self.complete_ids.clone(),
                malformed: Vec::new(),
            }))
        }

        async fn album(&self, _id: u64) -> Result<Option<CatalogPage>, CatalogError> {
            Ok(None)
        }

        async fn program_collection(&self, _id: u64) -> Result<Option<CatalogPage>, CatalogError> {
            Ok(None)
        }

        async fn play_urls(
            &self,
            _ids: &[u64],
            _quality: Quality,
        ) -> Result<Decoded<PlayUrlInfo>, CatalogError> {
            Ok(Decoded::default())
        }

        async fn tracks_by_ids(&self, ids: &[u64]) -> Result<Decoded<Track>, CatalogError> {
            let call = {
                let mut calls = self.detail_calls.lock().unwrap();
                calls.push(ids.to_vec());
                calls.len() - 1
            };
            if self.failing_detail_batch == Some(call) {
                return Err(CatalogError::http_status("fake", 500, None));
            }
            // Reverse to prove the resolver restores id-list order.
            Ok(Decoded::ok(ids.iter().rev().copied().map(track).collect()))
        }
    }

    fn resolver(service: FakeService) -> (CatalogResolver, Arc<FakeService>) {
        let service = Arc::new(service);
        let resolver = CatalogResolver::new(
            Arc::clone(&service) as Arc<dyn CatalogService>,
            Arc::new(CatalogCache::new()),
        )
        .with_batch_delay(Duration::ZERO);
        (resolver, service)
    }

    #[tokio::test]
    async fn test_resolve_caches_successful_items() {
        let (resolver, service) = resolver(FakeService::default());

        let first = resolver.resolve("123456").await.unwrap();
        let second = resolver.resolve("https://music.163.com/#/playlist?id=123456").await.unwrap();

        assert_eq!(first.title, "Mix");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(service.playlist_calls.load(Ordering::SeqCst), 1);
        assert!(resolver.cache().contains(&SourceRef::new(SourceKind::Playlist, 123_456)));
    }

    #[tokio::test]
    async fn test_failed_resolution_returns_empty_and_is_not_cached() {
        let (resolver, service) = resolver(FakeService {
            fail_playlist: true,
            ..FakeService::default()
        });

        let item = resolver.resolve("7").await.unwrap();
        assert!(item.tracks.is_empty());
        assert_eq!(item.id, 7);
        assert!(resolver.cache().is_empty());

        resolver.resolve("7").await.unwrap();
        assert_eq!(service.playlist_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unrecognized_reference_is_an_error() {
        let (resolver, _) = resolver(FakeService::default());
        let err = resolver.resolve("https://example.com/artist/1").await.unwrap_err();
        assert!(matches!(err, CatalogError::UnrecognizedReference { .. }));
    }

    #[tokio::test]
    async fn test_missing_album_yields_empty_item() {
        let (resolver, _) = resolver(FakeService::default());
        let item = resolver.resolve("https://music.163.com/album?id=5").await.unwrap();
        assert_eq!(item.kind, SourceKind::Album);
        assert!(item.tracks.is_empty());
    }

    #[tokio::test]
    async fn test_complete_id_list_refetched_in_order_and_batched() {
        let ids: Vec<u64> = (1..=2500).collect();
        let (resolver, service) = resolver(FakeService {
            complete_ids: Some(ids.clone()),
            ..FakeService::default()
        });

        let item = resolver.resolve("1").await.unwrap();

        assert_eq!(item.track_ids(), ids);
        let sizes: Vec<usize> = service
            .detail_calls
            .lock()
            .unwrap()
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
    }

    #[tokio::test]
    async fn test_failed_detail_batch_omits_only_its_tracks() {
        let ids: Vec<u64> = (1..=1500).collect();
        let (resolver, _) = resolver(FakeService {
            complete_ids: Some(ids),
            failing_detail_batch: Some(0),
            ..FakeService::default()
        });

        let item = resolver.resolve("1").await.unwrap();

        assert_eq!(item.tracks.len(), 500);
        assert_eq!(item.tracks[0].id, 1001);
    }

    #[tokio::test]
    async fn test_empty_id_list_keeps_embedded_tracks() {
        let (resolver, service) = resolver(FakeService {
            complete_ids: Some(Vec::new()),
            ..FakeService::default()
        });
        let item = resolver.resolve("1").await.unwrap();
        assert_eq!(item.track_ids(), vec![1]);
        assert!(service.detail_calls.lock().unwrap().is_empty());
    }
}
