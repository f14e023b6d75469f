//! One complete run: resolve, plan, download (or reconcile), summarize.

use std::collections::HashMap;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use playlist_dl_core::catalog::{
    CatalogCache, CatalogItem, CatalogResolver, NeteaseClient, NeteaseOptions, PlayUrlInfo,
    load_cookie_file, parse_reference,
};
use playlist_dl_core::download::{
    DownloadEngine, DownloadReport, FileNamer, HttpClient, JobPlan, NoopObserver,
    ProgressObserver, RetryPolicy, download_cover, plan_jobs, sanitize_field,
};
use playlist_dl_core::reconcile::{ReconcileReport, Reconciler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::config::{self, Settings};
use crate::app::progress::TerminalProgress;

/// How the process should exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Success,
    /// Nothing could be downloaded (bad reference, empty catalog).
    Fatal,
    /// The run finished but at least one job failed or was cancelled.
    PartialFailure,
}

impl From<RunOutcome> for ExitCode {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success => ExitCode::SUCCESS,
            RunOutcome::Fatal => ExitCode::from(1),
            RunOutcome::PartialFailure => ExitCode::from(2),
        }
    }
}

pub(crate) async fn run() -> Result<RunOutcome> {
    let (args, sources) = config::parse_cli_with_sources();
    init_tracing(args.quiet, args.verbose);
    debug!(?args, "CLI arguments parsed");

    let file_config = config::load_default_file_config()?;
    let settings = config::apply_config_defaults(args, &sources, file_config.as_ref());

    let source = match parse_reference(&settings.args.reference) {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, "cannot use this reference");
            return Ok(RunOutcome::Fatal);
        }
    };
    info!(kind = %source.kind, id = source.id, "resolving");

    let resolver = build_resolver(&settings)?;
    let catalog = resolver.resolve_source(source).await;
    if catalog.tracks.is_empty() {
        error!(kind = %source.kind, id = source.id, "catalog returned no tracks");
        return Ok(RunOutcome::Fatal);
    }
    info!(title = %catalog.title, tracks = catalog.tracks.len(), "catalog resolved");

    let play_urls = resolver
        .resolve_play_urls(&catalog.track_ids(), settings.args.quality)
        .await;
    let namer = FileNamer::new(&settings.args.format);

    if settings.args.rename {
        return run_reconcile(&settings, catalog, play_urls, namer).await;
    }

    let plan = match plan_jobs(
        &catalog,
        &play_urls,
        &namer,
        &settings.output_dir,
        settings.args.skip_trial,
    ) {
        Ok(plan) => plan,
        Err(e) => {
            error!(error = %e, "nothing to download");
            return Ok(RunOutcome::Fatal);
        }
    };
    report_excluded(&plan);

    let client = HttpClient::new()?;
    if settings.args.cover
        && let Some(cover_url) = &catalog.cover_url
    {
        let dir = collection_dir(&settings.output_dir, &catalog);
        if let Err(e) = download_cover(&client, cover_url, &dir).await {
            warn!(error = %e, "cover download failed");
        }
    }

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    let show_progress =
        settings.args.progress && !settings.args.quiet && io::stderr().is_terminal();
    let terminal = show_progress.then(|| Arc::new(TerminalProgress::new(plan.jobs.len())));
    let observer: Arc<dyn ProgressObserver> = match &terminal {
        Some(terminal) => Arc::clone(terminal) as Arc<dyn ProgressObserver>,
        None => Arc::new(NoopObserver),
    };

    let engine = DownloadEngine::new(
        usize::from(settings.args.concurrency),
        RetryPolicy::with_max_attempts(settings.args.retry_times),
        settings.attempt_timeout(),
    )?
    .skip_existing(settings.args.skip);

    let JobPlan {
        jobs,
        unresolved,
        trial_skipped,
    } = plan;
    let report = engine.download_all(jobs, &client, observer, &cancel).await;
    if let Some(terminal) = &terminal {
        terminal.finish();
    }

    if !settings.args.quiet {
        print_summary(&report, unresolved.len(), trial_skipped.len());
    }
    if cancel.is_cancelled() {
        warn!("interrupted; run again to fetch the remaining tracks");
    }

    Ok(if report.has_failures() || cancel.is_cancelled() {
        RunOutcome::PartialFailure
    } else {
        RunOutcome::Success
    })
}

fn init_tracing(quiet: bool, verbose: u8) {
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_resolver(settings: &Settings) -> Result<CatalogResolver> {
    let cookie = load_cookie_file(&settings.args.cookie)?;
    if cookie.is_some() {
        debug!(path = %settings.args.cookie.display(), "using catalog cookie");
    }
    let client = NeteaseClient::with_options(NeteaseOptions {
        base_url: settings.api_base_url.clone(),
        cookie,
        connect_timeout: settings.catalog_connect_timeout,
        read_timeout: settings.catalog_read_timeout,
        ..NeteaseOptions::default()
    })
    .context("failed to create catalog client")?;
    Ok(CatalogResolver::new(
        Arc::new(client),
        Arc::new(CatalogCache::new()),
    ))
}

/// `<output>/<sanitized collection title>`
fn collection_dir(output_dir: &Path, catalog: &CatalogItem) -> PathBuf {
    output_dir.join(sanitize_field(&catalog.title))
}

fn report_excluded(plan: &JobPlan) {
    for track in &plan.unresolved {
        info!(track_id = track.id, name = %track.name, "no play URL, not downloading");
    }
    if !plan.unresolved.is_empty() {
        warn!(count = plan.unresolved.len(), "tracks without a play URL");
    }
    if !plan.trial_skipped.is_empty() {
        info!(count = plan.trial_skipped.len(), "trial-only tracks skipped");
    }
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling downloads");
            cancel.cancel();
        }
    });
}

async fn run_reconcile(
    settings: &Settings,
    catalog: Arc<CatalogItem>,
    play_urls: HashMap<u64, PlayUrlInfo>,
    namer: FileNamer,
) -> Result<RunOutcome> {
    let root = collection_dir(&settings.output_dir, &catalog);
    info!(root = %root.display(), "reconciling existing files");

    let reconciler = Reconciler::new(namer, settings.output_dir.clone());
    let report: ReconcileReport = tokio::task::spawn_blocking(move || {
        reconciler.reconcile(&catalog, &play_urls, &root)
    })
    .await
    .context("reconcile task failed")??;

    if !settings.args.quiet {
        println!(
            "Reconciled {} files: {} matched, {} renamed to catalog names, {} renamed to fingerprints, {} unchanged, {} failed",
            report.scanned,
            report.matched,
            report.renamed_to_canonical,
            report.renamed_to_fingerprint,
            report.unchanged,
            report.failed
        );
    }
    Ok(if report.failed > 0 {
        RunOutcome::PartialFailure
    } else {
        RunOutcome::Success
    })
}

fn print_summary(report: &DownloadReport, unresolved: usize, trial_skipped: usize) {
    println!(
        "Done: {} downloaded, {} skipped, {} failed, {} unresolved, {} trial-skipped",
        report.succeeded, report.skipped, report.failed, unresolved, trial_skipped
    );
    for failure in report.failures() {
        println!(
            "  [{}] {}: {}",
            failure.index, failure.label, failure.outcome
        );
    }
}
