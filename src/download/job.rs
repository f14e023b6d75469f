//! Download jobs and the planning step that creates them from a resolved catalog.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::PlanError;
use super::filename::{AudioExtension, FileNamer, NamingContext, format_index, index_width};
use crate::catalog::{CatalogItem, PlayUrlInfo, Track};

/// One track scheduled for download.
///
/// Only constructible for tracks with a usable play URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    track: Track,
    play_url: PlayUrlInfo,
    url: String,
    target_path: PathBuf,
    position: usize,
    index: String,
}

impl DownloadJob {
    /// Creates a job, or `None` when `play_url` carries no usable URL.
    ///
    /// `position` is the 1-based catalog position; `width` the index padding.
    #[must_use]
    pub fn new(
        track: Track,
        play_url: PlayUrlInfo,
        target_path: PathBuf,
        position: usize,
        width: usize,
    ) -> Option<Self> {
        let url = play_url.resolved_url()?.to_string();
        Some(Self {
            track,
            play_url,
            url,
            target_path,
            position,
            index: format_index(position, width),
        })
    }

    #[must_use]
    pub fn track(&self) -> &Track {
        &self.track
    }

    #[must_use]
    pub fn play_url(&self) -> &PlayUrlInfo {
        &self.play_url
    }

    /// The resolved download URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Final destination path.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// 1-based catalog position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Zero-padded index as rendered into `:index`.
    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Short label for logs and progress bars.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} - {}", self.track.primary_artist(), self.track.name)
    }
}

/// Terminal state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The destination now holds the complete file.
    Succeeded {
        bytes: u64,
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// A non-empty file already existed at the destination.
    Skipped,
    /// Every allowed attempt failed, or a non-retryable error occurred.
    Failed { reason: String, attempts: u32 },
}

impl JobOutcome {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Attempts made; zero for skipped jobs.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
            Self::Skipped => 0,
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { bytes, .. } => write!(f, "succeeded ({bytes} bytes)"),
            Self::Skipped => f.write_str("skipped"),
            Self::Failed { reason, .. } => write!(f, "failed: {reason}"),
        }
    }
}

/// Result of turning a catalog into jobs.
#[derive(Debug, Clone, Default)]
pub struct JobPlan {
    /// Jobs in catalog order.
    pub jobs: Vec<DownloadJob>,
    /// Tracks without a usable play URL.
    pub unresolved: Vec<Track>,
    /// Trial-only tracks removed by the skip-trial filter.
    pub trial_skipped: Vec<Track>,
}

impl JobPlan {
    /// Destination paths claimed by more than one job, sorted.
    ///
    /// Colliding jobs are not disambiguated; the last one to finish wins.
    #[must_use]
    pub fn collisions(&self) -> Vec<PathBuf> {
        let mut counts: BTreeMap<&Path, usize> = BTreeMap::new();
        for job in &self.jobs {
            *counts.entry(job.target_path()).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(path, _)| path.to_path_buf())
            .collect()
    }
}

/// Builds download jobs for every track with a usable URL.
///
/// Index width and index values come from the full catalog (1-based catalog
/// position), so a track keeps the same `:index` whatever is filtered out.
///
/// # Errors
///
/// Returns [`PlanError::NoDownloadableTracks`] when no job remains.
pub fn plan_jobs(
    catalog: &CatalogItem,
    play_urls: &HashMap<u64, PlayUrlInfo>,
    namer: &FileNamer,
    output_dir: &Path,
    skip_trial: bool,
) -> Result<JobPlan, PlanError> {
    let width = index_width(catalog.tracks.len());
    let mut plan = JobPlan::default();

    for (offset, track) in catalog.tracks.iter().enumerate() {
        let position = offset + 1;
        let Some(info) = play_urls.get(&track.id).filter(|info| info.is_resolved()) else {
            debug!(track_id = track.id, name = %track.name, "no play url");
            plan.unresolved.push(track.clone());
            continue;
        };
        if skip_trial && info.is_trial {
            debug!(track_id = track.id, name = %track.name, "skipping trial-only track");
            plan.trial_skipped.push(track.clone());
            continue;
        }

        let extension = AudioExtension::from_url(info.resolved_url());
        let index = format_index(position, width);
        let relative = namer.render(&NamingContext {
            track,
            collection_title: &catalog.title,
            index: &index,
            extension: extension.as_str(),
        });

        if let Some(job) = DownloadJob::new(
            track.clone(),
            info.clone(),
            output_dir.join(relative),
            position,
            width,
        ) {
            plan.jobs.push(job);
        }
    }

    for path in plan.collisions() {
        warn!(path = %path.display(), "several tracks render to the same file; last writer wins");
    }

    if plan.jobs.is_empty() {
        return Err(PlanError::NoDownloadableTracks {
            total: catalog.tracks.len(),
            unresolved: plan.unresolved.len(),
            trial_skipped: plan.trial_skipped.len(),
        });
    }

    info!(
        jobs = plan.jobs.len(),
        unresolved = plan.unresolved.len(),
        trial_skipped = plan.trial_skipped.len(),
        "planned downloads"
    );
    Ok(plan)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::{AlbumRef, Artist, SourceKind};

    fn track(id: u64, name: &str) -> Track {
        Track {
            id,
            name: name.to_string(),
            artists: vec![Artist {
                id: 1,
                name: "Singer".to_string(),
            }],
            album: AlbumRef::default(),
            duration_ms: 0,
            episode: None,
        }
    }

    fn catalog(tracks: Vec<Track>) -> CatalogItem {
        CatalogItem {
            kind: SourceKind::Playlist,
            id: 123_456,
            title: "Mix".to_string(),
            cover_url: None,
            tracks,
        }
    }

    fn url(id: u64, url: Option<&str>, trial: bool) -> (u64, PlayUrlInfo) {
        (
            id,
            PlayUrlInfo {
                track_id: id,
                url: url.map(str::to_string),
                is_trial: trial,
                ..PlayUrlInfo::default()
            },
        )
    }

    #[test]
    fn test_unresolved_tracks_are_reported_not_scheduled() {
        let catalog = catalog(vec![track(1, "A"), track(2, "B")]);
        let urls = HashMap::from([url(1, Some("https://cdn/a.mp3"), false), url(2, None, false)]);

        let plan = plan_jobs(&catalog, &urls, &FileNamer::default(), Path::new("out"), false)
            .unwrap();

        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.unresolved.len(), 1);
        assert_eq!(plan.unresolved[0].id, 2);
        assert_eq!(plan.jobs[0].index(), "1");
        assert_eq!(plan.jobs[0].target_path(), Path::new("out/Mix/Singer - A.mp3"));
    }

    #[test]
    fn test_skip_trial_partitions_resolved_tracks() {
        let catalog = catalog(vec![track(1, "A"), track(2, "B"), track(3, "C")]);
        let urls = HashMap::from([
            url(1, Some("https://cdn/a.mp3"), false),
            url(2, Some("https://cdn/b.mp3"), true),
            url(3, Some("https://cdn/c.flac"), false),
        ]);

        let plan = plan_jobs(&catalog, &urls, &FileNamer::default(), Path::new("."), true).unwrap();
        let scheduled: Vec<u64> = plan.jobs.iter().map(|j| j.track().id).collect();
        let skipped: Vec<u64> = plan.trial_skipped.iter().map(|t| t.id).collect();
        assert_eq!(scheduled, vec![1, 3]);
        assert_eq!(skipped, vec![2]);
        assert!(plan.jobs[1].target_path().to_str().unwrap().ends_with(".flac"));

        let plan = plan_jobs(&catalog, &urls, &FileNamer::default(), Path::new("."), false).unwrap();
        assert_eq!(plan.jobs.len(), 3);
        assert!(plan.trial_skipped.is_empty());
    }

    #[test]
    fn test_index_uses_catalog_position_and_width() {
        let tracks: Vec<Track> = (1..=12).map(|i| track(i, &format!("T{i}"))).collect();
        let catalog = catalog(tracks);
        let urls: HashMap<u64, PlayUrlInfo> = (1..=12)
            .filter(|i| i % 2 == 0)
            .map(|i| url(i, Some("https://cdn/x.mp3"), false))
            .collect();

        let plan = plan_jobs(
            &catalog,
            &urls,
            &FileNamer::new(":index :songName.:ext"),
            Path::new(""),
            false,
        )
        .unwrap();

        let indices: Vec<&str> = plan.jobs.iter().map(DownloadJob::index).collect();
        assert_eq!(indices, vec!["02", "04", "06", "08", "10", "12"]);
        assert_eq!(plan.jobs[0].target_path(), Path::new("02 T2.mp3"));
    }

    #[test]
    fn test_no_downloadable_tracks() {
        let catalog = catalog(vec![track(1, "A"), track(2, "B")]);
        let urls = HashMap::from([url(1, Some("https://cdn/a.mp3"), true)]);

        let err = plan_jobs(&catalog, &urls, &FileNamer::default(), Path::new("."), true)
            .unwrap_err();
        let PlanError::NoDownloadableTracks {
            total,
            unresolved,
            trial_skipped,
        } = err;
        assert_eq!((total, unresolved, trial_skipped), (2, 1, 1));
    }

    #[test]
    fn test_collisions_are_detected() {
        let catalog = catalog(vec![track(1, "Same"), track(2, "Same"), track(3, "Other")]);
        let urls: HashMap<u64, PlayUrlInfo> = (1..=3)
            .map(|i| url(i, Some("https://cdn/x.mp3"), false))
            .collect();

        let plan = plan_jobs(&catalog, &urls, &FileNamer::default(), Path::new("o"), false).unwrap();
        assert_eq!(plan.jobs.len(), 3);
        assert_eq!(plan.collisions(), vec![PathBuf::from("o/Mix/Singer - Same.mp3")]);
    }

    #[test]
    fn test_job_requires_url() {
        let info = PlayUrlInfo {
            track_id: 1,
            url: Some(String::new()),
            ..PlayUrlInfo::default()
        };
        assert!(DownloadJob::new(track(1, "A"), info, PathBuf::from("a.mp3"), 1, 1).is_none());
    }

    #[test]
    fn test_outcome_display_and_attempts() {
        let ok = JobOutcome::Succeeded {
            bytes: 10,
            attempts: 2,
        };
        assert_eq!(ok.to_string(), "succeeded (10 bytes)");
        assert_eq!(ok.attempts(), 2);
        assert_eq!(JobOutcome::Skipped.attempts(), 0);
        assert!(
            JobOutcome::Failed {
                reason: "cancelled".to_string(),
                attempts: 1
            }
            .is_failed()
        );
    }
}
