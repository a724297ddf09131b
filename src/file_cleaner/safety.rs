use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform::{is_special_file_type, SPECIAL_BITS};
use super::types::{CandidateEntry, EntryKind, Reason};

/// Heuristic knobs, read-only for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub min_file_age_days: u32,
    pub clean_empty_dirs: bool,
    pub detect_duplicates: bool,
    /// Files smaller than this are never hashed.
    pub min_duplicate_size: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            min_file_age_days: 7,
            clean_empty_dirs: false,
            detect_duplicates: false,
            min_duplicate_size: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionSignal {
    StatFailure,
    RecentFile,
    AgeThresholdNotMet,
    SystemPath,
    SpecialPermission,
}

impl From<ProtectionSignal> for Reason {
    fn from(signal: ProtectionSignal) -> Self {
        match signal {
            ProtectionSignal::StatFailure => Reason::StatFailure,
            ProtectionSignal::RecentFile => Reason::RecentFile,
            ProtectionSignal::AgeThresholdNotMet => Reason::AgeThresholdNotMet,
            ProtectionSignal::SystemPath => Reason::SystemPath,
            ProtectionSignal::SpecialPermission => Reason::SpecialPermission,
        }
    }
}

lazy_static! {
    static ref SYSTEM_PATH_PREFIXES: Vec<PathBuf> = [
        "/System",
        "/Library/StartupItems",
        "/Library/LaunchAgents",
        "/Library/LaunchDaemons",
        "/private/var/db/dslocal",
        "/usr/bin",
        "/usr/sbin",
        "/usr/libexec",
        "/usr/share",
        "/usr/lib",
        "/bin",
        "/sbin",
        "/boot",
        "/etc",
        "/lib",
        "/lib64",
        "/proc",
        "/sys",
        "/dev",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
}

/// Component-wise prefix check, so `/binaries` is not under `/bin`.
pub fn is_system_path(path: &Path) -> bool {
    SYSTEM_PATH_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Heuristics only ever protect. Rules run in a fixed order and the first
/// one that fires decides the reason.
pub fn classify(
    entry: &CandidateEntry,
    thresholds: &Thresholds,
    run_started: DateTime<Utc>,
) -> Option<ProtectionSignal> {
    let meta = match entry.meta.as_ref() {
        Some(meta) => meta,
        None => return Some(ProtectionSignal::StatFailure),
    };

    // Recency
    match meta.modified {
        Some(modified) => {
            let min_age = ChronoDuration::days(i64::from(thresholds.min_file_age_days));
            if run_started.signed_duration_since(modified) < min_age {
                return Some(ProtectionSignal::RecentFile);
            }
        }
        None => return Some(ProtectionSignal::AgeThresholdNotMet),
    }

    if is_system_path(&entry.path) {
        return Some(ProtectionSignal::SystemPath);
    }

    let special_type = entry.kind != EntryKind::Symlink && is_special_file_type(meta.mode);
    if meta.mode & SPECIAL_BITS != 0 || meta.immutable || special_type {
        return Some(ProtectionSignal::SpecialPermission);
    }

    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Advisory risk of cleaning under `path`, shown alongside progress. Has no
/// influence on verdicts.
pub fn risk_level(path: &Path) -> RiskLevel {
    let lower = path.to_string_lossy().to_lowercase();
    let home = dirs::home_dir().map(|h| h.to_string_lossy().to_lowercase());
    let under_home = |suffix: &str| {
        home.as_ref()
            .map(|h| lower.starts_with(&format!("{}/{}", h.trim_end_matches('/'), suffix)))
            .unwrap_or(false)
    };

    const HIGH_KEYWORDS: &[&str] = &[
        "/system/",
        "/library/preferences/",
        "kernel_cache",
        "system_database",
    ];
    if under_home("library/preferences") || HIGH_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return RiskLevel::High;
    }

    const LOW_KEYWORDS: &[&str] = &[
        "browser_cache",
        "npm_cache",
        "pip_cache",
        "yarn_cache",
        "tmp_files",
    ];
    if under_home("library/caches")
        || under_home(".cache")
        || LOW_KEYWORDS.iter().any(|k| lower.contains(k))
    {
        return RiskLevel::Low;
    }

    RiskLevel::Medium
}
