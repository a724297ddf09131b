use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::duplicate_detector::DuplicateScanResult;
use super::types::{Action, EntryKind, Outcome, Reason, Verdict};

/// Run-scoped accumulator. Every counter is updated atomically so workers
/// on different roots can record concurrently.
#[derive(Debug, Default)]
pub struct RunStatistics {
    analyzed_files: AtomicU64,
    analyzed_dirs: AtomicU64,
    cleaned_files: AtomicU64,
    cleaned_dirs: AtomicU64,
    protected: AtomicU64,
    skipped: AtomicU64,
    recent_protected: AtomicU64,
    bytes_reclaimed: AtomicU64,
    errors: AtomicU64,
    hash_errors: AtomicU64,
    duplicate_groups: AtomicU64,
    duplicates_found: AtomicU64,
    duplicate_bytes: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub analyzed: u64,
    pub analyzed_files: u64,
    pub analyzed_dirs: u64,
    pub cleaned: u64,
    pub cleaned_files: u64,
    pub cleaned_dirs: u64,
    pub protected: u64,
    pub skipped: u64,
    pub recent_protected: u64,
    pub bytes_reclaimed: u64,
    pub errors: u64,
    pub hash_errors: u64,
    pub duplicate_groups: u64,
    pub duplicates_found: u64,
    pub duplicate_bytes: u64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_verdict(&self, verdict: &Verdict) {
        match verdict.entry().kind {
            EntryKind::Directory => bump(&self.analyzed_dirs, 1),
            EntryKind::File | EntryKind::Symlink => bump(&self.analyzed_files, 1),
        }
        match verdict.action() {
            Action::Protect => bump(&self.protected, 1),
            Action::Skip => bump(&self.skipped, 1),
            Action::Delete => {}
        }
        match verdict.reason() {
            Reason::RecentFile => bump(&self.recent_protected, 1),
            Reason::StatFailure => bump(&self.errors, 1),
            _ => {}
        }
    }

    pub fn record_outcome(&self, verdict: &Verdict, outcome: &Outcome) {
        if verdict.action() != Action::Delete {
            return;
        }
        if outcome.is_error() {
            bump(&self.errors, 1);
            return;
        }
        match verdict.entry().kind {
            EntryKind::Directory => bump(&self.cleaned_dirs, 1),
            _ => bump(&self.cleaned_files, 1),
        }
        bump(&self.bytes_reclaimed, outcome.reclaimed_bytes);
    }

    pub fn record_duplicates(&self, scan: &DuplicateScanResult) {
        bump(&self.duplicate_groups, scan.groups.len() as u64);
        for group in &scan.groups {
            bump(&self.duplicates_found, group.duplicates.len() as u64);
            bump(&self.duplicate_bytes, group.reclaimable_bytes());
        }
        let failures = scan.failures.len() as u64;
        bump(&self.hash_errors, failures);
        bump(&self.errors, failures);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let analyzed_files = load(&self.analyzed_files);
        let analyzed_dirs = load(&self.analyzed_dirs);
        let cleaned_files = load(&self.cleaned_files);
        let cleaned_dirs = load(&self.cleaned_dirs);
        StatsSnapshot {
            analyzed: analyzed_files + analyzed_dirs,
            analyzed_files,
            analyzed_dirs,
            cleaned: cleaned_files + cleaned_dirs,
            cleaned_files,
            cleaned_dirs,
            protected: load(&self.protected),
            skipped: load(&self.skipped),
            recent_protected: load(&self.recent_protected),
            bytes_reclaimed: load(&self.bytes_reclaimed),
            errors: load(&self.errors),
            hash_errors: load(&self.hash_errors),
            duplicate_groups: load(&self.duplicate_groups),
            duplicates_found: load(&self.duplicates_found),
            duplicate_bytes: load(&self.duplicate_bytes),
        }
    }
}
