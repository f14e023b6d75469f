//! Templated, sanitized destination paths for tracks.
//!
//! A template such as `:name/:singer - :songName.:ext` is parsed once into
//! literal and placeholder pieces. Rendering substitutes each placeholder with
//! an independently sanitized field, then re-sanitizes every `/`-separated
//! segment of the assembled path and enforces the length limits.
//!
//! | Placeholder | Value |
//! |-------------|-------|
//! | `:name` | playlist, album or program title |
//! | `:singer` | first credited artist |
//! | `:songName` | track name |
//! | `:albumName` | album name |
//! | `:ext` | audio file extension |
//! | `:index` | zero-padded catalog position |
//! | `:programDate` | episode date `YYYY-MM-DD` (program tracks only) |
//! | `:programOrder` | episode serial number (program tracks only) |
//!
//! Unknown placeholders, and program placeholders outside a program context,
//! are left verbatim.

use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::catalog::Track;

/// Maximum characters per path segment.
pub const MAX_SEGMENT_CHARS: usize = 90;

/// Maximum characters of the whole rendered relative path.
pub const MAX_PATH_CHARS: usize = 200;

/// Default naming template.
pub const DEFAULT_TEMPLATE: &str = ":name/:singer - :songName.:ext";

/// Replacement for a value that sanitizes to nothing.
const UNKNOWN: &str = "Unknown";

/// Longest extension preserved when a file name is clamped.
const MAX_PRESERVED_EXTENSION_CHARS: usize = 10;

const RESERVED_DEVICE_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Audio container chosen from the play URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AudioExtension {
    #[default]
    Mp3,
    Flac,
    M4a,
}

impl AudioExtension {
    /// Returns the extension without a leading dot.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::M4a => "m4a",
        }
    }

    /// Derives the extension from the URL path suffix; anything unrecognized,
    /// unparseable or absent is `mp3`.
    #[must_use]
    pub fn from_url(url: Option<&str>) -> Self {
        let Some(parsed) = url.and_then(|u| Url::parse(u).ok()) else {
            return Self::default();
        };
        let suffix = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|last| last.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match suffix.as_deref() {
            Some("flac") => Self::Flac,
            Some("m4a") => Self::M4a,
            _ => Self::Mp3,
        }
    }
}

impl fmt::Display for AudioExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Width of the zero-padded index for a collection of `total` tracks.
#[must_use]
pub fn index_width(total: usize) -> usize {
    total.max(1).to_string().len()
}

/// Formats a 1-based position left-padded with zeros to `width`.
#[must_use]
pub fn format_index(position: usize, width: usize) -> String {
    format!("{position:0width$}")
}

/// Everything a template can refer to for one track.
#[derive(Debug, Clone, Copy)]
pub struct NamingContext<'a> {
    pub track: &'a Track,
    /// Title of the playlist, album or program.
    pub collection_title: &'a str,
    /// Already zero-padded index.
    pub index: &'a str,
    /// Extension without the dot.
    pub extension: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    Name,
    Singer,
    SongName,
    AlbumName,
    Ext,
    Index,
    ProgramDate,
    ProgramOrder,
}

impl Placeholder {
    const ALL: [(&'static str, Placeholder); 8] = [
        (":name", Self::Name),
        (":singer", Self::Singer),
        (":songName", Self::SongName),
        (":albumName", Self::AlbumName),
        (":ext", Self::Ext),
        (":index", Self::Index),
        (":programDate", Self::ProgramDate),
        (":programOrder", Self::ProgramOrder),
    ];

    /// Longest placeholder token at the start of `input`.
    fn match_prefix(input: &str) -> Option<(&'static str, Self)> {
        Self::ALL
            .iter()
            .filter(|(token, _)| input.starts_with(token))
            .max_by_key(|(token, _)| token.len())
            .copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Field(Placeholder, &'static str),
}

/// Renders destination paths from a naming template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNamer {
    template: String,
    pieces: Vec<Piece>,
}

impl Default for FileNamer {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl FileNamer {
    /// Parses a template in a single left-to-right pass.
    #[must_use]
    pub fn new(template: &str) -> Self {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(ch) = rest.chars().next() {
            if ch == ':' {
                if let Some((token, placeholder)) = Placeholder::match_prefix(rest) {
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Field(placeholder, token));
                    rest = &rest[token.len()..];
                    continue;
                }
            }
            literal.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Self {
            template: template.to_string(),
            pieces,
        }
    }

    /// Returns the template this namer was built from.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Renders the relative destination path for one track.
    ///
    /// Deterministic: the same context always yields the same path.
    #[must_use]
    pub fn render(&self, ctx: &NamingContext<'_>) -> PathBuf {
        let mut assembled = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => assembled.push_str(text),
                Piece::Field(placeholder, token) => {
                    assembled.push_str(&field_value(*placeholder, token, ctx));
                }
            }
        }
        finalize_path(&assembled)
    }
}

fn field_value(placeholder: Placeholder, token: &str, ctx: &NamingContext<'_>) -> String {
    let episode = ctx.track.episode;
    match placeholder {
        Placeholder::Name => sanitize_field(ctx.collection_title),
        Placeholder::Singer => sanitize_field(ctx.track.primary_artist()),
        Placeholder::SongName => sanitize_field(&ctx.track.name),
        Placeholder::AlbumName => sanitize_field(&ctx.track.album.name),
        Placeholder::Ext => sanitize_field(&ctx.extension.to_ascii_lowercase()),
        Placeholder::Index => sanitize_field(ctx.index),
        Placeholder::ProgramDate => episode.map_or_else(
            || token.to_string(),
            |ep| ep.date.format("%Y-%m-%d").to_string(),
        ),
        Placeholder::ProgramOrder => {
            episode.map_or_else(|| token.to_string(), |ep| ep.order.to_string())
        }
    }
}

/// Sanitizes one substituted value so it is a single safe segment.
///
/// Illegal characters map 1:1 to full-width look-alikes, tab/CR/LF become
/// spaces, other control characters are removed.
#[must_use]
pub fn sanitize_field(value: &str) -> String {
    let mapped: String = value
        .chars()
        .filter_map(|ch| match ch {
            '/' => Some('／'),
            '\\' => Some('＼'),
            ':' => Some('：'),
            '*' => Some('＊'),
            '?' => Some('？'),
            '"' => Some('＂'),
            '<' => Some('＜'),
            '>' => Some('＞'),
            '|' => Some('｜'),
            '\t' | '\r' | '\n' => Some(' '),
            c if is_stripped_control(c) => None,
            c => Some(c),
        })
        .collect();
    finalize_segment(&mapped, false)
}

fn is_stripped_control(ch: char) -> bool {
    ch <= '\u{1f}' || ch == '\u{7f}'
}

/// Second pass over the assembled path: each segment is cleaned again and
/// clamped, then the stem of the file name absorbs any overflow of the total.
fn finalize_path(assembled: &str) -> PathBuf {
    let raw_segments: Vec<&str> = assembled.split('/').filter(|s| !s.is_empty()).collect();
    let last = raw_segments.len().saturating_sub(1);
    let mut segments: Vec<String> = raw_segments
        .iter()
        .enumerate()
        .map(|(i, segment)| finalize_segment(segment, i == last))
        .collect();

    if segments.is_empty() {
        segments.push(UNKNOWN.to_string());
    }

    let total: usize = segments.iter().map(|s| s.chars().count()).sum::<usize>()
        + segments.len().saturating_sub(1);
    if total > MAX_PATH_CHARS {
        let overflow = total - MAX_PATH_CHARS;
        if let Some(file_name) = segments.last_mut() {
            *file_name = shorten_stem(file_name, overflow);
        }
    }

    segments.iter().collect()
}

fn finalize_segment(segment: &str, keep_extension: bool) -> String {
    let cleaned = clean_segment(segment);
    let named = if cleaned.is_empty() {
        UNKNOWN.to_string()
    } else {
        guard_reserved(cleaned)
    };
    clamp_segment(&named, MAX_SEGMENT_CHARS, keep_extension)
}

/// Strips control characters, collapses whitespace, trims, and drops
/// trailing dots and spaces.
fn clean_segment(segment: &str) -> String {
    let collapsed = segment
        .chars()
        .filter(|c| !is_stripped_control(*c) || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed.trim_end_matches(['.', ' ']).to_string()
}

fn guard_reserved(segment: String) -> String {
    let stem = segment.split('.').next().unwrap_or_default();
    if RESERVED_DEVICE_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
    {
        format!("_{segment}")
    } else {
        segment
    }
}

fn split_extension(segment: &str) -> Option<(&str, &str)> {
    let (stem, ext) = segment.rsplit_once('.')?;
    let ext_chars = ext.chars().count();
    (!stem.is_empty() && ext_chars > 0 && ext_chars <= MAX_PRESERVED_EXTENSION_CHARS)
        .then_some((stem, ext))
}

fn clamp_segment(segment: &str, max_chars: usize, keep_extension: bool) -> String {
    if segment.chars().count() <= max_chars {
        return segment.to_string();
    }

    if keep_extension {
        if let Some((stem, ext)) = split_extension(segment) {
            let stem_budget = max_chars.saturating_sub(ext.chars().count() + 1).max(1);
            let stem = truncate_chars(stem, stem_budget);
            return format!("{stem}.{ext}");
        }
    }

    let truncated = truncate_chars(segment, max_chars);
    if truncated.is_empty() {
        UNKNOWN.to_string()
    } else {
        truncated
    }
}

/// Removes `overflow` characters from the stem, keeping at least one.
fn shorten_stem(file_name: &str, overflow: usize) -> String {
    match split_extension(file_name) {
        Some((stem, ext)) => {
            let keep = stem.chars().count().saturating_sub(overflow).max(1);
            format!("{}.{ext}", truncate_chars(stem, keep))
        }
        None => {
            let keep = file_name.chars().count().saturating_sub(overflow).max(1);
            truncate_chars(file_name, keep)
        }
    }
}

/// Takes at most `max` characters and trims trailing spaces and dots.
fn truncate_chars(value: &str, max: usize) -> String {
    let taken: String = value.chars().take(max).collect();
    let trimmed = taken.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        taken
    } else {
        trimmed.to_string()
    }
}
