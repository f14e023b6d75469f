//! Audio file discovery and content fingerprints.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use super::ReconcileError;

/// Extensions treated as audio, compared case-insensitively.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "aac", "ogg", "m4a"];

const READ_BUFFER: usize = 64 * 1024;

/// Lowercased audio extension of `path`, or `None` for anything else.
#[must_use]
pub fn audio_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    AUDIO_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Lowercase hex MD5 of the file's bytes, read in chunks.
///
/// # Errors
///
/// Returns the IO error from opening or reading the file.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}

/// Audio files under `root`, recursively, sorted by path.
///
/// Unreadable entries below the root are logged and skipped.
///
/// # Errors
///
/// Returns [`ReconcileError::NotADirectory`] when `root` is not a directory
/// and [`ReconcileError::Scan`] when the root itself cannot be listed.
pub fn scan_audio_files(root: &Path) -> Result<Vec<PathBuf>, ReconcileError> {
    if !root.is_dir() {
        return Err(ReconcileError::not_a_directory(root));
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(ReconcileError::scan(root, err)),
            Err(err) => {
                warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && audio_extension(entry.path()).is_some() {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_audio_extension_is_case_insensitive() {
        assert_eq!(audio_extension(Path::new("a/B.MP3")), Some("mp3".to_string()));
        assert_eq!(audio_extension(Path::new("x.Flac")), Some("flac".to_string()));
        assert_eq!(audio_extension(Path::new("cover.jpg")), None);
        assert_eq!(audio_extension(Path::new("noext")), None);
    }

    #[test]
    fn test_fingerprint_matches_known_md5() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            fingerprint_file(&path).unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_fingerprint_spans_multiple_buffers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.flac");
        let data = vec![3u8; READ_BUFFER * 2 + 17];
        std::fs::write(&path, &data).unwrap();
        assert_eq!(
            fingerprint_file(&path).unwrap(),
            format!("{:x}", md5::compute(&data))
        );
    }

    #[test]
    fn test_scan_finds_nested_audio_only() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"1").unwrap();
        std::fs::write(dir.path().join("sub/deeper/a.OGG"), b"2").unwrap();
        std::fs::write(dir.path().join("cover.jpg"), b"3").unwrap();

        let found = scan_audio_files(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("b.mp3"), dir.path().join("sub/deeper/a.OGG")]
        );
    }

    #[test]
    fn test_scan_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = scan_audio_files(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ReconcileError::NotADirectory { .. }));
    }
}
