/// Trait for reporting rebuild and reindex progress.
///
/// The CLI implements it with indicatif bars. All methods have default no-op
/// implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_rebuild_start(&self) {}
    fn on_plan_complete(&self, _entries: usize, _duration_secs: f64) {}
    fn on_materialize_progress(&self, _done: usize, _total: usize) {}
    fn on_swap_complete(&self, _entries: usize, _duration_secs: f64) {}
    fn on_index_start(&self, _total: usize) {}
    fn on_index_progress(&self, _indexed: usize, _total: usize) {}
    fn on_index_complete(&self, _indexed: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
