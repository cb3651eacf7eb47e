use serde::Serialize;
use tracing::warn;

/// One item a batch could not process, with the reason it was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    pub item: String,
    pub reason: String,
}

/// Aggregated result of a batch: how many items succeeded and which were
/// skipped. Per-item failures land here instead of aborting the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub skipped: Vec<SkippedItem>,
}

impl BatchOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self) {
        self.succeeded += 1;
    }

    pub fn skip(&mut self, item: impl Into<String>, reason: impl ToString) {
        let item = item.into();
        let reason = reason.to_string();
        warn!("Skipping {}: {}", item, reason);
        self.skipped.push(SkippedItem { item, reason });
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        self.succeeded += other.succeeded;
        self.skipped.extend(other.skipped);
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}
