//! Integration tests for catalog resolution against a mock catalog API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use playlist_dl_core::catalog::{
    CatalogCache, CatalogResolver, NeteaseClient, NeteaseOptions, Quality, SourceKind, SourceRef,
    load_cookie_file,
};
use playlist_dl_core::download::RetryPolicy;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

// ==================== Helper Functions ====================

/// Retry policy with millisecond delays so retry tests stay fast.
fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50), 2.0)
}

fn client_for(server: &MockServer, cookie: Option<String>) -> NeteaseClient {
    NeteaseClient::with_options(NeteaseOptions {
        base_url: format!("{}/api", server.uri()),
        cookie,
        retry: fast_retry(),
        ..NeteaseOptions::default()
    })
    .unwrap()
}

fn resolver_for(client: NeteaseClient) -> CatalogResolver {
    CatalogResolver::new(Arc::new(client), Arc::new(CatalogCache::new()))
        .with_batch_delay(Duration::ZERO)
}

fn song(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "ar": [{"id": 7, "name": "Singer"}],
        "al": {"id": 70, "name": "Album", "picUrl": "https://img/70.jpg"},
        "dt": 180_000
    })
}

/// Answers play-url calls with one entry per requested id and records batch sizes.
struct PlayUrlResponder {
    batches: Arc<Mutex<Vec<usize>>>,
}

impl Respond for PlayUrlResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let ids: Vec<u64> = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "ids")
            .and_then(|(_, value)| serde_json::from_str(&value).ok())
            .unwrap_or_default();
        self.batches.lock().unwrap().push(ids.len());

        let data: Vec<Value> = ids
            .iter()
            .map(|id| json!({"id": id, "url": format!("https://cdn/{id}.mp3"), "br": 320_000, "size": 1, "md5": null}))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({"code": 200, "data": data}))
    }
}

// ==================== Resolution ====================

#[tokio::test]
async fn test_playlist_with_complete_id_list_is_refetched_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v6/playlist/detail"))
        .and(query_param("id", "123456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "playlist": {
                "name": "Mix",
                "coverImgUrl": "https://img/mix.jpg",
                "tracks": [song(1, "One")],
                "trackIds": [{"id": 3}, {"id": 1}, {"id": 2}]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/song/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "songs": [song(1, "One"), song(2, "Two"), song(3, "Three")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver_for(client_for(&server, None));
    let item = resolver.resolve("https://music.163.com/#/playlist?id=123456").await.unwrap();

    assert_eq!(item.kind, SourceKind::Playlist);
    assert_eq!(item.title, "Mix");
    assert_eq!(item.cover_url.as_deref(), Some("https://img/mix.jpg"));
    assert_eq!(item.track_ids(), vec![3, 1, 2]);

    // Second resolution is served from the cache (mock expects exactly one call).
    let again = resolver
        .resolve_source(SourceRef::new(SourceKind::Playlist, 123_456))
        .await;
    assert!(Arc::ptr_eq(&item, &again));
}

#[tokio::test]
async fn test_album_resolution() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/album/32311"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "album": {"name": "Record", "picUrl": "https://img/a.jpg"},
            "songs": [song(10, "Ten"), song(11, "Eleven")]
        })))
        .mount(&server)
        .await;

    let resolver = resolver_for(client_for(&server, None));
    let item = resolver.resolve("https://music.163.com/album?id=32311").await.unwrap();

    assert_eq!(item.kind, SourceKind::Album);
    assert_eq!(item.title, "Record");
    assert_eq!(item.track_ids(), vec![10, 11]);
}

#[tokio::test]
async fn test_unknown_id_is_empty_and_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v6/playlist/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 404, "msg": "not found"})))
        .expect(2)
        .mount(&server)
        .await;

    let resolver = resolver_for(client_for(&server, None));
    let source = SourceRef::new(SourceKind::Playlist, 1);

    assert!(resolver.resolve_source(source).await.tracks.is_empty());
    assert!(resolver.cache().is_empty());
    assert!(resolver.resolve_source(source).await.tracks.is_empty());
}

#[tokio::test]
async fn test_transient_catalog_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/album/5"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/album/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "album": {"name": "Late", "songs": [song(1, "One")]}
        })))
        .mount(&server)
        .await;

    let resolver = resolver_for(client_for(&server, None));
    let item = resolver
        .resolve_source(SourceRef::new(SourceKind::Album, 5))
        .await;
    assert_eq!(item.title, "Late");
    assert_eq!(item.tracks.len(), 1);
}

// ==================== Play URLs ====================

#[tokio::test]
async fn test_play_urls_are_batched_by_200() {
    let server = MockServer::start().await;
    let batches = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("GET"))
        .and(path("/api/song/enhance/player/url"))
        .and(query_param("br", "320000"))
        .respond_with(PlayUrlResponder {
            batches: Arc::clone(&batches),
        })
        .mount(&server)
        .await;

    let resolver = resolver_for(client_for(&server, None));
    let ids: Vec<u64> = (1..=450).collect();
    let urls = resolver.resolve_play_urls(&ids, Quality::Kbps320).await;

    assert_eq!(*batches.lock().unwrap(), vec![200, 200, 50]);
    assert_eq!(urls.len(), 450);
    assert_eq!(urls[&450].url.as_deref(), Some("https://cdn/450.mp3"));
}

#[tokio::test]
async fn test_failed_play_url_batch_leaves_ids_unresolved() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/song/enhance/player/url"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let resolver = resolver_for(client_for(&server, None));
    let urls = resolver.resolve_play_urls(&[1, 2, 3], Quality::Max).await;
    assert!(urls.is_empty());
}

// ==================== Cookies ====================

#[tokio::test]
async fn test_cookie_file_is_sent_to_catalog() {
    let dir = TempDir::new().unwrap();
    let cookie_path = dir.path().join("yun.cookie.txt");
    std::fs::write(&cookie_path, "// exported from the browser\n\nMUSIC_U=abc123\n").unwrap();
    let cookie = load_cookie_file(&cookie_path).unwrap();
    assert_eq!(cookie.as_deref(), Some("MUSIC_U=abc123"));

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/album/9"))
        .and(header("cookie", "MUSIC_U=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "album": {"name": "Members only", "songs": [song(1, "One")]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver_for(client_for(&server, cookie));
    let item = resolver
        .resolve_source(SourceRef::new(SourceKind::Album, 9))
        .await;
    assert_eq!(item.title, "Members only");
}

#[test]
fn test_missing_cookie_file_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let cookie = load_cookie_file(&dir.path().join("absent.txt")).unwrap();
    assert!(cookie.is_none());
}
