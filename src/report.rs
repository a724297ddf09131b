// src/report.rs

use bytesize::ByteSize;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{CleanError, Result};
use crate::file_cleaner::engine::RunReport;
use crate::file_cleaner::types::{Action, CleanEvent};
use crate::ops::RunObserver;

/// Observer that keeps every verdict/outcome pair for the report file.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Mutex<Vec<CleanEvent>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events sorted by path, so two runs over the same tree compare equal.
    pub fn events(&self) -> Vec<CleanEvent> {
        let mut events = self.lock().clone();
        events.sort_by(|a, b| a.path.cmp(&b.path));
        events
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CleanEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RunObserver for EventCollector {
    fn on_event(&self, event: &CleanEvent) {
        self.lock().push(event.clone());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub deleted: u64,
    pub protected: u64,
    pub skipped: u64,
    pub errors: u64,
    pub bytes: u64,
}

pub fn totals_by_category(events: &[CleanEvent]) -> BTreeMap<String, CategoryTotals> {
    let mut totals: BTreeMap<String, CategoryTotals> = BTreeMap::new();
    for event in events {
        let entry = totals.entry(event.category.as_str().to_string()).or_default();
        if event.error.is_some() {
            entry.errors += 1;
            continue;
        }
        match event.action {
            Action::Delete => {
                entry.deleted += 1;
                entry.bytes += event.bytes;
            }
            Action::Protect => entry.protected += 1,
            Action::Skip => entry.skipped += 1,
        }
    }
    totals
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedReport {
    pub report: RunReport,
    pub categories: BTreeMap<String, CategoryTotals>,
    pub events: Vec<CleanEvent>,
}

/// `<data_dir>/deepclean/reports`, if the platform has a data directory.
pub fn default_report_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("deepclean").join("reports"))
}

/// Writes the run as pretty JSON and returns the file path.
pub fn write_report(dir: &Path, report: &RunReport, events: Vec<CleanEvent>) -> Result<PathBuf> {
    let stamp = report
        .finished_at
        .with_timezone(&Local)
        .format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("deepclean_report_{}.json", stamp));
    let io_error = |source| CleanError::ReportWrite {
        path: path.clone(),
        source,
    };

    fs::create_dir_all(dir).map_err(io_error)?;
    let persisted = PersistedReport {
        report: report.clone(),
        categories: totals_by_category(&events),
        events,
    };
    let data = serde_json::to_vec_pretty(&persisted).map_err(|err| io_error(err.into()))?;
    fs::write(&path, data).map_err(io_error)?;

    log::info!("Report written to {}", path.display());
    Ok(path)
}

pub fn format_summary(report: &RunReport) -> String {
    let stats = &report.stats;
    let mut out = String::new();
    let mode = if report.simulated { "Simulation" } else { "Cleaning" };
    let status = if report.cancelled { " (cancelled)" } else { "" };

    let _ = writeln!(out, "{} summary{}", mode, status);
    let _ = writeln!(
        out,
        "  Analyzed:   {} files, {} directories",
        stats.analyzed_files, stats.analyzed_dirs
    );
    let _ = writeln!(
        out,
        "  {}    {} files, {} directories",
        if report.simulated { "Would clean:" } else { "Cleaned:    " },
        stats.cleaned_files,
        stats.cleaned_dirs
    );
    let _ = writeln!(
        out,
        "  {} {}",
        if report.simulated { "Would free: " } else { "Freed:      " },
        ByteSize(stats.bytes_reclaimed)
    );
    let _ = writeln!(
        out,
        "  Protected:  {} ({} recent)",
        stats.protected, stats.recent_protected
    );
    let _ = writeln!(out, "  Skipped:    {}", stats.skipped);
    if stats.duplicate_groups > 0 {
        let _ = writeln!(
            out,
            "  Duplicates: {} copies in {} groups ({})",
            stats.duplicates_found,
            stats.duplicate_groups,
            ByteSize(stats.duplicate_bytes)
        );
    }
    let _ = writeln!(out, "  Errors:     {}", stats.errors);
    let _ = write!(out, "  Duration:   {} ms", report.duration_ms);
    out
}
