use catalog_projector::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Planning: spinner
/// - Materializing and indexing: progress bar with a known total
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        match self.bar.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.guard();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.guard().take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(&self, message: &str) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars(TICK_CHARS));
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn bar(&self, label: &str, total: usize) {
        let pb = ProgressBar::new(total as u64);
        let template = format!(
            "  {{spinner:.cyan}} {label} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} ({{eta}} remaining)"
        );
        if let Ok(style) = ProgressStyle::with_template(&template) {
            pb.set_style(style.progress_chars("━╸─").tick_chars(TICK_CHARS));
        }
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn advance(&self, done: usize, total: usize) {
        if let Some(pb) = self.guard().as_ref() {
            if pb.length() != Some(total as u64) {
                pb.set_length(total as u64);
            }
            pb.set_position(done as u64);
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_rebuild_start(&self) {
        self.spinner("Planning virtual tree...");
    }

    fn on_plan_complete(&self, entries: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Plan complete: {} entries in {:.2}s",
            entries, duration_secs
        );
        self.bar("Materializing", entries);
    }

    fn on_materialize_progress(&self, done: usize, total: usize) {
        self.advance(done, total);
    }

    fn on_swap_complete(&self, entries: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m View swapped in: {} entries in {:.2}s",
            entries, duration_secs
        );
    }

    fn on_index_start(&self, total: usize) {
        self.bar("Indexing", total);
    }

    fn on_index_progress(&self, indexed: usize, total: usize) {
        self.advance(indexed, total);
    }

    fn on_index_complete(&self, indexed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Index complete: {} documents in {:.2}s",
            indexed, duration_secs
        );
    }
}
