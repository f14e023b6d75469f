//! Matching files already on disk to catalog tracks by content.
//!
//! The pass never downloads. Each audio file under the root is fingerprinted
//! (MD5 of its bytes) and compared with the hash the catalog reports for each
//! track's play URL:
//!
//! 1. Every audio file that matches no track is renamed to
//!    `<root>/<fingerprint>.<ext>`, clearing any canonical path it held.
//! 2. Each matching file is then renamed to its track's canonical templated
//!    path.
//!
//! Existing files are never overwritten, so a second pass over the same
//! directory performs no renames.

mod error;
mod fingerprint;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::catalog::{CatalogItem, PlayUrlInfo};
use crate::download::{FileNamer, NamingContext, format_index, index_width};

pub use error::ReconcileError;
pub use fingerprint::{AUDIO_EXTENSIONS, audio_extension, fingerprint_file, scan_audio_files};

/// Counts from one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Audio files found under the root.
    pub scanned: usize,
    /// Files whose fingerprint matched a catalog track.
    pub matched: usize,
    pub renamed_to_canonical: usize,
    pub renamed_to_fingerprint: usize,
    /// Files already in place, or whose destination was occupied.
    pub unchanged: usize,
    /// Files that could not be read or renamed.
    pub failed: usize,
}

impl ReconcileReport {
    #[must_use]
    pub fn renamed(&self) -> usize {
        self.renamed_to_canonical + self.renamed_to_fingerprint
    }
}

struct ScannedFile {
    path: PathBuf,
    fingerprint: String,
    extension: String,
}

/// Renames on-disk audio files to match a resolved catalog.
#[derive(Debug, Clone)]
pub struct Reconciler {
    namer: FileNamer,
    output_dir: PathBuf,
}

impl Reconciler {
    /// Canonical paths are `output_dir` joined with the namer's rendering,
    /// the same destinations a download run would use.
    #[must_use]
    pub fn new(namer: FileNamer, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            namer,
            output_dir: output_dir.into(),
        }
    }

    /// Runs one pass over `root_dir`.
    ///
    /// Tracks without a catalog-reported hash cannot be matched. Per-file
    /// failures are logged and counted; they do not stop the pass.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when `root_dir` cannot be scanned.
    #[instrument(skip_all, fields(root = %root_dir.display(), tracks = catalog.tracks.len()))]
    pub fn reconcile(
        &self,
        catalog: &CatalogItem,
        play_urls: &HashMap<u64, PlayUrlInfo>,
        root_dir: &Path,
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut report = ReconcileReport::default();
        let files = fingerprint_all(root_dir, &mut report)?;

        let mut by_fingerprint: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, file) in files.iter().enumerate() {
            by_fingerprint
                .entry(file.fingerprint.as_str())
                .or_default()
                .push(idx);
        }

        let width = index_width(catalog.tracks.len());
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut placements: Vec<(usize, PathBuf)> = Vec::new();

        for (offset, track) in catalog.tracks.iter().enumerate() {
            let Some(hash) = play_urls
                .get(&track.id)
                .and_then(|info| info.content_hash.as_deref())
            else {
                continue;
            };
            let Some(candidates) = by_fingerprint.get(hash) else {
                continue;
            };

            let index = format_index(offset + 1, width);
            let canonical_for = |file: &ScannedFile| {
                self.output_dir.join(self.namer.render(&NamingContext {
                    track,
                    collection_title: &catalog.title,
                    index: &index,
                    extension: &file.extension,
                }))
            };

            let open: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|idx| !claimed.contains(idx))
                .collect();
            // Candidates are in path order; one already in place wins.
            let Some(&chosen) = open
                .iter()
                .find(|&&idx| same_location(&files[idx].path, &canonical_for(&files[idx])))
                .or_else(|| open.first())
            else {
                continue;
            };

            claimed.insert(chosen);
            report.matched += 1;
            debug!(track_id = track.id, path = %files[chosen].path.display(), "fingerprint matched");
            placements.push((chosen, canonical_for(&files[chosen])));
        }

        // Unmatched files move aside first so they cannot hold a canonical path.
        for (idx, file) in files.iter().enumerate() {
            if claimed.contains(&idx) {
                continue;
            }
            let destination = root_dir.join(format!("{}.{}", file.fingerprint, file.extension));
            match move_file(&file.path, &destination) {
                MoveOutcome::Moved => report.renamed_to_fingerprint += 1,
                MoveOutcome::InPlace | MoveOutcome::Occupied => report.unchanged += 1,
                MoveOutcome::Failed => report.failed += 1,
            }
        }

        // A match may wait on another match vacating its destination.
        let mut pending = placements;
        loop {
            let before = pending.len();
            let mut blocked = Vec::new();
            for (idx, destination) in pending {
                match move_file(&files[idx].path, &destination) {
                    MoveOutcome::Moved => report.renamed_to_canonical += 1,
                    MoveOutcome::InPlace => report.unchanged += 1,
                    MoveOutcome::Occupied => blocked.push((idx, destination)),
                    MoveOutcome::Failed => report.failed += 1,
                }
            }
            pending = blocked;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }
        for (idx, destination) in &pending {
            warn!(
                from = %files[*idx].path.display(),
                to = %destination.display(),
                "canonical path holds a different file, leaving match in place"
            );
            report.unchanged += 1;
        }

        info!(
            scanned = report.scanned,
            matched = report.matched,
            renamed = report.renamed(),
            failed = report.failed,
            "reconcile finished"
        );
        Ok(report)
    }
}

fn fingerprint_all(
    root_dir: &Path,
    report: &mut ReconcileReport,
) -> Result<Vec<ScannedFile>, ReconcileError> {
    let paths = scan_audio_files(root_dir)?;
    report.scanned = paths.len();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(extension) = audio_extension(&path) else {
            continue;
        };
        match fingerprint_file(&path) {
            Ok(fingerprint) => files.push(ScannedFile {
                path,
                fingerprint,
                extension,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot fingerprint file");
                report.failed += 1;
            }
        }
    }
    Ok(files)
}

enum MoveOutcome {
    Moved,
    InPlace,
    Occupied,
    Failed,
}

fn move_file(from: &Path, to: &Path) -> MoveOutcome {
    if same_location(from, to) {
        return MoveOutcome::InPlace;
    }
    if to.exists() {
        debug!(from = %from.display(), to = %to.display(), "destination exists");
        return MoveOutcome::Occupied;
    }
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty())
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(dir = %parent.display(), error = %e, "cannot create directory");
        return MoveOutcome::Failed;
    }
    match std::fs::rename(from, to) {
        Ok(()) => {
            info!(from = %from.display(), to = %to.display(), "renamed");
            MoveOutcome::Moved
        }
        Err(e) => {
            warn!(from = %from.display(), to = %to.display(), error = %e, "rename failed");
            MoveOutcome::Failed
        }
    }
}

/// True when both paths name the same existing file.
fn same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
