//! Catalog data model: tracks, artists, play-URL info and resolved catalog items.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The kind of remote collection a reference points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// User or editorial playlist.
    Playlist,
    /// Album release.
    Album,
    /// Episodic program collection (radio).
    Program,
}

impl SourceKind {
    /// Returns a stable lowercase label for logs and display.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Playlist => "playlist",
            Self::Album => "album",
            Self::Program => "program",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A performing artist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: u64,
    pub name: String,
}

/// Album reference embedded in a track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: u64,
    pub name: String,
    pub cover_url: Option<String>,
}

/// Episode metadata for tracks that belong to a program collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEpisode {
    /// Air/creation date of the episode.
    pub date: NaiveDate,
    /// Serial number of the episode within its program.
    pub order: u32,
}

/// One song entity. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: u64,
    pub name: String,
    /// Artists in catalog order.
    pub artists: Vec<Artist>,
    pub album: AlbumRef,
    pub duration_ms: u64,
    /// Present only for tracks resolved from a program collection.
    pub episode: Option<ProgramEpisode>,
}

impl Track {
    /// Returns the first credited artist's name, or an empty string.
    #[must_use]
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map_or("", |artist| artist.name.as_str())
    }
}

/// Resolved download information for a single track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayUrlInfo {
    pub track_id: u64,
    /// Absent when the catalog refused to serve this track.
    pub url: Option<String>,
    /// Bitrate in bits per second as reported by the catalog.
    pub bitrate: u32,
    pub size_bytes: u64,
    /// Lowercase hex MD5 of the served file, when the catalog reports one.
    pub content_hash: Option<String>,
    /// True when the URL only serves a truncated preview.
    pub is_trial: bool,
}

impl PlayUrlInfo {
    /// Returns the URL if it is present and non-empty.
    #[must_use]
    pub fn resolved_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|url| !url.trim().is_empty())
    }

    /// Returns true if the track has a usable download URL.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved_url().is_some()
    }
}

/// A resolved playlist, album or program with its ordered track list.
///
/// Track order is the canonical display and index order and is never re-sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub kind: SourceKind,
    pub id: u64,
    pub title: String,
    pub cover_url: Option<String>,
    pub tracks: Vec<Track>,
}

impl CatalogItem {
    /// Creates an item with no tracks, used when the catalog could not be reached.
    #[must_use]
    pub fn empty(kind: SourceKind, id: u64) -> Self {
        Self {
            kind,
            id,
            title: String::new(),
            cover_url: None,
            tracks: Vec::new(),
        }
    }

    /// Returns the track ids in catalog order.
    #[must_use]
    pub fn track_ids(&self) -> Vec<u64> {
        self.tracks.iter().map(|track| track.id).collect()
    }
}

/// Requested audio quality, expressed as a bitrate ceiling in kbps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Quality {
    Kbps128,
    Kbps192,
    Kbps320,
    /// Highest bitrate the catalog will serve.
    #[default]
    Max,
}

impl Quality {
    /// Returns the kbps value used on the command line (999 means highest).
    #[must_use]
    pub fn kbps(self) -> u32 {
        match self {
            Self::Kbps128 => 128,
            Self::Kbps192 => 192,
            Self::Kbps320 => 320,
            Self::Max => 999,
        }
    }

    /// Returns the `br` request parameter in bits per second.
    #[must_use]
    pub fn bitrate_param(self) -> u32 {
        self.kbps() * 1000
    }
}

impl TryFrom<u32> for Quality {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            128 => Ok(Self::Kbps128),
            192 => Ok(Self::Kbps192),
            320 => Ok(Self::Kbps320),
            999 => Ok(Self::Max),
            other => Err(format!(
                "unsupported quality {other}: expected one of 128, 192, 320, 999"
            )),
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(['k', 'K']);
        let value: u32 = trimmed
            .parse()
            .map_err(|_| format!("invalid quality '{s}': expected one of 128, 192, 320, 999"))?;
        Self::try_from(value)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.kbps())
    }
}
