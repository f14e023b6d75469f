//! Per-run memoization of resolved catalog items.

use std::sync::Arc;

use dashmap::DashMap;

use super::{CatalogItem, SourceRef};

/// Concurrent cache of resolved catalog items keyed by `(kind, id)`.
///
/// Constructed once per run and handed to the resolver; read-mostly, no
/// cross-entry locking.
#[derive(Debug, Default)]
pub struct CatalogCache {
    entries: DashMap<SourceRef, Arc<CatalogItem>>,
}

impl CatalogCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached item for a reference.
    #[must_use]
    pub fn get(&self, source: &SourceRef) -> Option<Arc<CatalogItem>> {
        self.entries.get(source).map(|entry| Arc::clone(entry.value()))
    }

    /// Stores an item, replacing any previous entry for the same reference.
    pub fn insert(&self, source: SourceRef, item: Arc<CatalogItem>) {
        self.entries.insert(source, item);
    }

    /// Returns true if the reference is cached.
    #[must_use]
    pub fn contains(&self, source: &SourceRef) -> bool {
        self.entries.contains_key(source)
    }

    /// Returns the number of cached items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached references.
    #[must_use]
    pub fn keys(&self) -> Vec<SourceRef> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }

    /// Drops every cached item.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SourceKind;

    #[test]
    fn test_cache_keyed_by_kind_and_id() {
        let cache = CatalogCache::new();
        let playlist = SourceRef::new(SourceKind::Playlist, 1);
        let album = SourceRef::new(SourceKind::Album, 1);

        cache.insert(playlist, Arc::new(CatalogItem::empty(SourceKind::Playlist, 1)));

        assert!(cache.contains(&playlist));
        assert!(!cache.contains(&album));
        assert!(cache.get(&album).is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.keys(), vec![playlist]);
    }

    #[test]
    fn test_cache_clear() {
        let cache = CatalogCache::new();
        cache.insert(
            SourceRef::new(SourceKind::Album, 9),
            Arc::new(CatalogItem::empty(SourceKind::Album, 9)),
        );
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }
}
