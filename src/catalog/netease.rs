//! HTTP implementation of [`CatalogService`] for the NetEase Cloud Music API.
//!
//! Every response is decoded into all-optional raw structs first and then
//! converted entry by entry, so one bad track never discards its batch.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{
    AlbumRef, Artist, CatalogError, CatalogItem, CatalogPage, CatalogService, Decoded,
    MalformedMetadata, PlayUrlInfo, Quality, SourceKind, Track, cookie_jar_for,
};
use crate::download::{RetryDecision, RetryPolicy, parse_retry_after};
use crate::user_agent;

/// Public API root.
pub const DEFAULT_API_BASE_URL: &str = "https://music.163.com/api";

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// Success code carried in the JSON envelope.
const API_OK: i64 = 200;

/// Connection settings for [`NeteaseClient`].
#[derive(Debug, Clone)]
pub struct NeteaseOptions {
    /// API root, without a trailing slash.
    pub base_url: String,
    /// Cookie header value (`k=v; k2=v2`) sent with every call.
    pub cookie: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Per-call retry policy.
    pub retry: RetryPolicy,
}

impl Default for NeteaseOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            cookie: None,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            retry: RetryPolicy::catalog(),
        }
    }
}

/// Catalog client over the public JSON API.
#[derive(Debug, Clone)]
pub struct NeteaseClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl NeteaseClient {
    /// Creates a client for the public API with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(cookie: Option<&str>) -> Result<Self, CatalogError> {
        Self::with_options(NeteaseOptions {
            cookie: cookie.map(str::to_string),
            ..NeteaseOptions::default()
        })
    }

    /// Creates a client from explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidBaseUrl`] for a non-absolute base URL and
    /// [`CatalogError::ClientBuild`] if the HTTP client cannot be built.
    pub fn with_options(options: NeteaseOptions) -> Result<Self, CatalogError> {
        let base_url = options.base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url).map_err(|_| CatalogError::InvalidBaseUrl {
            url: base_url.clone(),
        })?;

        let mut builder = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.read_timeout)
            .user_agent(user_agent::catalog_user_agent())
            .gzip(true);
        if let Some(cookie) = options.cookie.as_deref().filter(|c| !c.trim().is_empty()) {
            builder = builder.cookie_provider(cookie_jar_for(cookie, &parsed));
        }
        let client = builder
            .build()
            .map_err(|source| CatalogError::ClientBuild { source })?;

        Ok(Self {
            client,
            base_url,
            retry: options.retry,
        })
    }

    /// Returns the API root this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url, CatalogError> {
        let raw = format!("{}{path}", self.base_url);
        let mut url = Url::parse(&raw).map_err(|_| CatalogError::InvalidBaseUrl { url: raw })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// GET with the retry state machine applied.
    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, CatalogError> {
        let mut attempt = 1;
        loop {
            match self.get_json_once(url).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let hint = error.retry_after().and_then(parse_retry_after);
                    match self
                        .retry
                        .should_retry_with_hint(error.failure_type(), attempt, hint)
                    {
                        RetryDecision::Retry {
                            delay,
                            attempt: next,
                        } => {
                            warn!(
                                url = %url,
                                attempt,
                                delay_ms = delay.as_millis(),
                                error = %error,
                                "catalog call failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            attempt = next;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(url = %url, attempt, %reason, "giving up on catalog call");
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T, CatalogError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CatalogError::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(CatalogError::http_status(
                url.as_str(),
                status.as_u16(),
                retry_after,
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::network(url.as_str(), e))?;
        serde_json::from_str(&body)
            .map_err(|e| CatalogError::malformed_response(url.as_str(), e.to_string()))
    }
}

#[async_trait]
impl CatalogService for NeteaseClient {
    #[instrument(skip(self))]
    async fn playlist(&self, id: u64) -> Result<Option<CatalogPage>, CatalogError> {
        let url = self.endpoint(
            "/v6/playlist/detail",
            &[
                ("id", id.to_string()),
                ("n", "100000".to_string()),
                ("s", "8".to_string()),
            ],
        )?;
        let envelope: PlaylistEnvelope = self.get_json(&url).await?;
        if !envelope.code_ok() {
            return Ok(None);
        }
        Ok(envelope.playlist.map(|raw| raw.into_page(id)))
    }

    #[instrument(skip(self))]
    async fn album(&self, id: u64) -> Result<Option<CatalogPage>, CatalogError> {
        let url = self.endpoint(&format!("/v1/album/{id}"), &[])?;
        let envelope: AlbumEnvelope = self.get_json(&url).await?;
        if !envelope.code_ok() {
            return Ok(None);
        }
        Ok(envelope.into_page(id))
    }

    #[instrument(skip(self))]
    async fn program_collection(&self, id: u64) -> Result<Option<CatalogPage>, CatalogError> {
        let url = self.endpoint(
            "/dj/program/byradio",
            &[
                ("radioId", id.to_string()),
                ("limit", "1000".to_string()),
                ("offset", "0".to_string()),
                ("asc", "false".to_string()),
            ],
        )?;
        let envelope: ProgramEnvelope = self.get_json(&url).await?;
        if !envelope.code_ok() {
            return Ok(None);
        }
        Ok(Some(envelope.into_page(id)))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn play_urls(
        &self,
        ids: &[u64],
        quality: Quality,
    ) -> Result<Decoded<PlayUrlInfo>, CatalogError> {
        let url = self.endpoint(
            "/song/enhance/player/url",
            &[
                ("ids", json_id_list(ids)),
                ("br", quality.bitrate_param().to_string()),
            ],
        )?;
        let envelope: DataEnvelope = self.get_json(&url).await?;
        Ok(decode_entries(
            envelope.data.unwrap_or_default(),
            "play url",
            |raw: RawPlayUrl| raw.try_into(),
        ))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn tracks_by_ids(&self, ids: &[u64]) -> Result<Decoded<Track>, CatalogError> {
        let c = serde_json::to_string(
            &ids.iter()
                .map(|id| serde_json::json!({ "id": id }))
                .collect::<Vec<_>>(),
        )
        .map_err(|e| CatalogError::malformed_response("song detail request", e.to_string()))?;
        let url = self.endpoint("/v3/song/detail", &[("c", c)])?;
        let envelope: SongsEnvelope = self.get_json(&url).await?;
        Ok(decode_tracks(
            envelope.songs.unwrap_or_default(),
            &AlbumFallback::default(),
        ))
    }
}

/// `[1,2,3]`
fn json_id_list(ids: &[u64]) -> String {
    let joined = ids
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("[{joined}]")
}

/// Decodes each JSON entry independently, collecting failures as values.
fn decode_entries<R, T>(
    entries: Vec<Value>,
    entity: &'static str,
    convert: impl Fn(R) -> Result<T, MalformedMetadata>,
) -> Decoded<T>
where
    R: DeserializeOwned,
{
    let mut decoded = Decoded::default();
    for entry in entries {
        let id = entry.get("id").and_then(Value::as_u64);
        match serde_json::from_value::<R>(entry) {
            Ok(raw) => match convert(raw) {
                Ok(item) => decoded.items.push(item),
                Err(malformed) => decoded.malformed.push(malformed),
            },
            Err(e) => decoded
                .malformed
                .push(MalformedMetadata::new(entity, id, e.to_string())),
        }
    }
    decoded
}

/// Album-level values that fill gaps in each track of an album response.
#[derive(Debug, Default)]
struct AlbumFallback {
    cover_url: Option<String>,
    artist: Option<Artist>,
}

fn decode_tracks(entries: Vec<Value>, fallback: &AlbumFallback) -> Decoded<Track> {
    decode_entries(entries, "track", |raw: RawTrack| {
        let mut track = Track::try_from(raw)?;
        if track.album.cover_url.is_none() {
            track.album.cover_url.clone_from(&fallback.cover_url);
        }
        if track.artists.iter().all(|artist| artist.name.trim().is_empty())
            && let Some(artist) = &fallback.artist
        {
            track.artists = vec![artist.clone()];
        }
        Ok(track)
    })
}

fn code_ok(code: Option<i64>) -> bool {
    code.is_none_or(|code| code == API_OK)
}

// ==================== Raw response shapes ====================

#[derive(Debug, Deserialize)]
struct PlaylistEnvelope {
    code: Option<i64>,
    playlist: Option<RawPlaylist>,
}

impl PlaylistEnvelope {
    fn code_ok(&self) -> bool {
        code_ok(self.code)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlaylist {
    name: Option<String>,
    cover_img_url: Option<String>,
    tracks: Option<Vec<Value>>,
    track_ids: Option<Vec<RawTrackId>>,
}

#[derive(Debug, Deserialize)]
struct RawTrackId {
    id: Option<u64>,
}

impl RawPlaylist {
    fn into_page(self, id: u64) -> CatalogPage {
        let decoded = decode_tracks(self.tracks.unwrap_or_default(), &AlbumFallback::default());
        let track_ids = self
            .track_ids
            .map(|ids| ids.into_iter().filter_map(|entry| entry.id).collect());
        CatalogPage {
            item: CatalogItem {
                kind: SourceKind::Playlist,
                id,
                title: self.name.unwrap_or_default(),
                cover_url: self.cover_img_url,
                tracks: decoded.items,
            },
            track_ids,
            malformed: decoded.malformed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AlbumEnvelope {
    code: Option<i64>,
    album: Option<RawAlbumDetail>,
    songs: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAlbumDetail {
    name: Option<String>,
    pic_url: Option<String>,
    artist: Option<RawArtist>,
    songs: Option<Vec<Value>>,
}

impl AlbumEnvelope {
    fn code_ok(&self) -> bool {
        code_ok(self.code)
    }

    fn into_page(self, id: u64) -> Option<CatalogPage> {
        let album = self.album?;
        let songs = album.songs.or(self.songs).unwrap_or_default();
        let fallback = AlbumFallback {
            cover_url: album.pic_url.clone(),
            artist: album
                .artist
                .filter(|artist| artist.name.as_deref().is_some_and(|n| !n.trim().is_empty()))
                .map(Artist::from),
        };
        let decoded = decode_tracks(songs, &fallback);
        Some(CatalogPage {
            item: CatalogItem {
                kind: SourceKind::Album,
                id,
                title: album.name.unwrap_or_default(),
                cover_url: album.pic_url,
                tracks: decoded.items,
            },
            track_ids: None,
            malformed: decoded.malformed,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProgramEnvelope {
    code: Option<i64>,
    programs: Option<Vec<RawProgram>>,
}

#[derive(Debug, Deserialize)]
struct RawProgram {
    radio: Option<RawRadio>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRadio {
    name: Option<String>,
    pic_url: Option<String>,
}

impl ProgramEnvelope {
    fn code_ok(&self) -> bool {
        code_ok(self.code)
    }

    /// Display fields only; episode track listing is not resolved.
    fn into_page(self, id: u64) -> CatalogPage {
        let radio = self
            .programs
            .and_then(|programs| programs.into_iter().next())
            .and_then(|program| program.radio);
        let (title, cover_url) = radio.map_or((String::new(), None), |radio| {
            (radio.name.unwrap_or_default(), radio.pic_url)
        });
        CatalogPage {
            item: CatalogItem {
                kind: SourceKind::Program,
                id,
                title,
                cover_url,
                tracks: Vec::new(),
            },
            track_ids: None,
            malformed: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    data: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct SongsEnvelope {
    songs: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    id: Option<u64>,
    name: Option<String>,
    #[serde(alias = "artists")]
    ar: Option<Vec<RawArtist>>,
    #[serde(alias = "album")]
    al: Option<RawAlbumRef>,
    #[serde(alias = "duration")]
    dt: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawArtist {
    id: Option<u64>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAlbumRef {
    id: Option<u64>,
    name: Option<String>,
    pic_url: Option<String>,
}

impl From<RawArtist> for Artist {
    fn from(raw: RawArtist) -> Self {
        Self {
            id: raw.id.unwrap_or_default(),
            name: raw.name.unwrap_or_default(),
        }
    }
}

impl TryFrom<RawTrack> for Track {
    type Error = MalformedMetadata;

    fn try_from(raw: RawTrack) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .ok_or_else(|| MalformedMetadata::new("track", None, "missing id"))?;
        let name = raw
            .name
            .ok_or_else(|| MalformedMetadata::new("track", Some(id), "missing name"))?;
        let artists = raw
            .ar
            .unwrap_or_default()
            .into_iter()
            .map(Artist::from)
            .collect();
        let album = raw.al.map_or_else(AlbumRef::default, |album| AlbumRef {
            id: album.id.unwrap_or_default(),
            name: album.name.unwrap_or_default(),
            cover_url: album.pic_url,
        });
        Ok(Self {
            id,
            name,
            artists,
            album,
            duration_ms: raw.dt.unwrap_or_default(),
            episode: None,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlayUrl {
    id: Option<u64>,
    url: Option<String>,
    br: Option<u32>,
    size: Option<u64>,
    md5: Option<String>,
    free_trial_info: Option<Value>,
}

impl TryFrom<RawPlayUrl> for PlayUrlInfo {
    type Error = MalformedMetadata;

    fn try_from(raw: RawPlayUrl) -> Result<Self, Self::Error> {
        let track_id = raw
            .id
            .ok_or_else(|| MalformedMetadata::new("play url", None, "missing id"))?;
        Ok(Self {
            track_id,
            url: raw.url,
            bitrate: raw.br.unwrap_or_default(),
            size_bytes: raw.size.unwrap_or_default(),
            content_hash: raw
                .md5
                .filter(|md5| !md5.is_empty())
                .map(|md5| md5.to_ascii_lowercase()),
            is_trial: raw.free_trial_info.is_some_and(|info| !info.is_null()),
        })
    }
}
