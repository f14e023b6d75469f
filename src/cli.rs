//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use playlist_dl_core::Quality;
use playlist_dl_core::download::{DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_TEMPLATE};

/// Default cookie file, looked up relative to the working directory.
pub const DEFAULT_COOKIE_FILE: &str = "yun.cookie.txt";

/// Default per-attempt timeout in minutes.
pub const DEFAULT_RETRY_TIMEOUT_MINS: u64 = 3;

/// Download a music playlist, album or program into templated files.
///
/// REFERENCE is a catalog URL (playlist, album or radio) or a plain
/// playlist id.
#[derive(Parser, Debug, Clone)]
#[command(name = "playlist-dl")]
#[command(author, version, about)]
pub struct Args {
    /// Playlist, album or program URL, or a numeric playlist id
    pub reference: String,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long)]
    pub quiet: bool,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// File naming template (:name, :singer, :songName, :albumName, :ext, :index, :programDate, :programOrder)
    #[arg(short = 'f', long, default_value = DEFAULT_TEMPLATE)]
    pub format: String,

    /// Audio quality in kbps: 128, 192, 320 or 999 (highest available)
    #[arg(short = 'q', long, default_value = "999")]
    pub quality: Quality,

    /// Per-attempt download timeout in minutes (1-60)
    #[arg(long, default_value_t = DEFAULT_RETRY_TIMEOUT_MINS, value_parser = clap::value_parser!(u64).range(1..=60))]
    pub retry_timeout: u64,

    /// Total download attempts per track (1-10)
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub retry_times: u32,

    /// Skip tracks whose destination file already exists
    #[arg(short = 's', long, default_value_t = true, action = ArgAction::Set)]
    pub skip: bool,

    /// Show per-track progress bars
    #[arg(short = 'p', long, default_value_t = true, action = ArgAction::Set)]
    pub progress: bool,

    /// Also save the collection cover as cover.jpg
    #[arg(long)]
    pub cover: bool,

    /// Cookie file sent to the catalog (lines starting with // are ignored)
    #[arg(long, default_value = DEFAULT_COOKIE_FILE)]
    pub cookie: PathBuf,

    /// Do not download tracks that only serve a trial preview
    #[arg(long)]
    pub skip_trial: bool,

    /// Rename existing files to match the catalog instead of downloading
    #[arg(long)]
    pub rename: bool,

    /// Output directory (default: current directory)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let args = Args::try_parse_from(["playlist-dl", "123456"]).unwrap();
        assert_eq!(args.reference, "123456");
        assert_eq!(args.concurrency, 5);
        assert_eq!(args.format, ":name/:singer - :songName.:ext");
        assert_eq!(args.quality, Quality::Max);
        assert_eq!(args.retry_timeout, 3);
        assert_eq!(args.retry_times, 3);
        assert!(args.skip);
        assert!(args.progress);
        assert!(!args.cover);
        assert!(!args.skip_trial);
        assert!(!args.rename);
        assert_eq!(args.cookie, PathBuf::from("yun.cookie.txt"));
        assert!(args.output_dir.is_none());
    }

    #[test]
    fn test_cli_reference_is_required() {
        let err = Args::try_parse_from(["playlist-dl"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_quality_values() {
        let args = Args::try_parse_from(["playlist-dl", "1", "-q", "320"]).unwrap();
        assert_eq!(args.quality, Quality::Kbps320);

        let err = Args::try_parse_from(["playlist-dl", "1", "--quality", "256"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_concurrency_range() {
        let args = Args::try_parse_from(["playlist-dl", "1", "-c", "100"]).unwrap();
        assert_eq!(args.concurrency, 100);

        for bad in ["0", "101"] {
            let err = Args::try_parse_from(["playlist-dl", "1", "-c", bad]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_boolean_switches_take_values() {
        let args =
            Args::try_parse_from(["playlist-dl", "1", "--skip", "false", "-p", "false"]).unwrap();
        assert!(!args.skip);
        assert!(!args.progress);
    }

    #[test]
    fn test_cli_verbose_and_quiet() {
        let args = Args::try_parse_from(["playlist-dl", "1", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["playlist-dl", "1", "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_retry_times_zero_rejected() {
        let err = Args::try_parse_from(["playlist-dl", "1", "--retry-times", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_mode_flags() {
        let args = Args::try_parse_from([
            "playlist-dl",
            "https://music.163.com/#/album?id=32311",
            "--rename",
            "--cover",
            "--skip-trial",
            "-o",
            "music",
        ])
        .unwrap();
        assert!(args.rename);
        assert!(args.cover);
        assert!(args.skip_trial);
        assert_eq!(args.output_dir, Some(PathBuf::from("music")));
    }
}
