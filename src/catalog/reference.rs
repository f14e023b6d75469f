//! Parsing of user-supplied catalog references into a kind and a numeric id.

use std::sync::LazyLock;

use regex::Regex;

use super::{CatalogError, SourceKind};

/// Id extraction patterns, tried in order; the first match wins.
static ID_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        compile_static_regex(r"[?&]id=(\d+)"),
        compile_static_regex(r"/(\d+)(?:[/?#]|$)"),
        compile_static_regex(r"^(\d+)$"),
    ]
});

static PLAIN_ID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"^\d+$"));

/// Kind keywords, checked in order.
const KIND_KEYWORDS: [(SourceKind, &[&str]); 3] = [
    (SourceKind::Playlist, &["playlist", "歌单"]),
    (SourceKind::Album, &["album", "专辑"]),
    (SourceKind::Program, &["djradio", "radio", "电台"]),
];

/// Compiles a regex at static init; panics on invalid pattern.
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// A parsed catalog reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub id: u64,
}

impl SourceRef {
    /// Creates a reference from parts.
    #[must_use]
    pub fn new(kind: SourceKind, id: u64) -> Self {
        Self { kind, id }
    }
}

/// Parses a URL or plain id into a [`SourceRef`].
///
/// # Errors
///
/// Returns [`CatalogError::UnrecognizedReference`] when no kind keyword is
/// present and the input is not a plain decimal id, and
/// [`CatalogError::IdNotFound`] when the kind is known but no id can be read.
pub fn parse_reference(input: &str) -> Result<SourceRef, CatalogError> {
    let trimmed = input.trim();
    let kind = detect_kind(trimmed).ok_or_else(|| CatalogError::unrecognized(trimmed))?;
    let id = extract_id(trimmed).ok_or_else(|| CatalogError::id_not_found(trimmed))?;
    Ok(SourceRef { kind, id })
}

/// Detects the reference kind from keywords; plain numeric ids default to playlists.
#[must_use]
pub fn detect_kind(input: &str) -> Option<SourceKind> {
    let lower = input.to_lowercase();
    for (kind, keywords) in KIND_KEYWORDS {
        if keywords.iter().any(|keyword| lower.contains(keyword)) {
            return Some(kind);
        }
    }
    PLAIN_ID_RE.is_match(input).then_some(SourceKind::Playlist)
}

/// Extracts the numeric id: `id=` query parameter, then a numeric path
/// segment, then the whole string.
#[must_use]
pub fn extract_id(input: &str) -> Option<u64> {
    ID_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(input)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}
