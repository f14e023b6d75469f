//! Terminal progress bars driven by download engine events.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use playlist_dl_core::download::{JobOutcome, ProgressEvent, ProgressKind, ProgressObserver};

const BAR_TEMPLATE: &str =
    "{prefix:>4} {bar:30.cyan/blue} {bytes:>10}/{total_bytes:<10} {wide_msg}";
const OVERALL_TEMPLATE: &str = "{spinner} [{pos}/{len}] {wide_msg}";

/// One overall bar plus one bar per active job.
pub(crate) struct TerminalProgress {
    multi: MultiProgress,
    overall: ProgressBar,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    style: ProgressStyle,
}

impl TerminalProgress {
    pub(crate) fn new(total_jobs: usize) -> Self {
        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_jobs as u64));
        overall.set_style(
            ProgressStyle::with_template(OVERALL_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        overall.enable_steady_tick(Duration::from_millis(120));
        overall.set_message("downloading");

        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        Self {
            multi,
            overall,
            bars: Mutex::new(HashMap::new()),
            style,
        }
    }

    /// Clears the overall bar once the engine returned.
    pub(crate) fn finish(&self) {
        self.overall.finish_and_clear();
    }

    fn bar_for(&self, bars: &mut HashMap<usize, ProgressBar>, event: &ProgressEvent) -> ProgressBar {
        bars.entry(event.position)
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(0));
                bar.set_style(self.style.clone());
                bar.set_prefix(format!("#{}", event.position));
                bar.set_message(event.label.clone());
                bar
            })
            .clone()
    }
}

impl ProgressObserver for TerminalProgress {
    fn on_event(&self, event: ProgressEvent) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        match &event.kind {
            ProgressKind::JobStarted => {
                self.bar_for(&mut bars, &event);
            }
            ProgressKind::BytesTransferred { downloaded, total } => {
                let bar = self.bar_for(&mut bars, &event);
                if let Some(total) = total {
                    bar.set_length(*total);
                }
                bar.set_position(*downloaded);
            }
            ProgressKind::Retrying { attempt, delay } => {
                let bar = self.bar_for(&mut bars, &event);
                bar.set_position(0);
                bar.set_message(format!(
                    "{} (attempt {attempt} in {}s)",
                    event.label,
                    delay.as_secs()
                ));
            }
            ProgressKind::JobFinished { outcome } => {
                if let Some(bar) = bars.remove(&event.position) {
                    bar.finish_and_clear();
                    self.multi.remove(&bar);
                }
                if let JobOutcome::Failed { reason, .. } = outcome {
                    self.overall
                        .println(format!("failed: {} ({reason})", event.label));
                }
                self.overall.inc(1);
            }
        }
    }
}
