use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Category tag attached to every candidate. Roots carry one of the first
/// five; the walker tags unreadable nodes with `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Cache,
    Temp,
    PackageManager,
    Log,
    Custom,
    EmptyDir,
    Duplicate,
    Error,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cache => "cache",
            Category::Temp => "temp",
            Category::PackageManager => "package_manager",
            Category::Log => "log",
            Category::Custom => "custom",
            Category::EmptyDir => "empty_dir",
            Category::Duplicate => "duplicate",
            Category::Error => "error",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// Metadata captured once at enumeration time. Never re-read for the
/// verdict of the same run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Raw `st_mode` (file type + permission bits); 0 where unavailable.
    pub mode: u32,
    /// Immutable or append-only flag set on the inode.
    pub immutable: bool,
    /// Directory had zero entries when enumerated.
    pub is_empty_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEntry {
    /// Logical (non-canonicalized) absolute path.
    pub path: PathBuf,
    /// Root this entry was enumerated under.
    pub root: PathBuf,
    pub kind: EntryKind,
    pub category: Category,
    /// `None` when the node could not be stat'ed or read.
    pub meta: Option<EntryMeta>,
    pub error: Option<String>,
}

impl CandidateEntry {
    pub fn size(&self) -> u64 {
        self.meta.as_ref().map(|m| m.size).unwrap_or(0)
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.meta.as_ref().and_then(|m| m.modified)
    }

    /// Path relative to the root it was found under.
    pub fn relative_path(&self) -> &Path {
        self.path.strip_prefix(&self.root).unwrap_or(&self.path)
    }

    pub fn is_empty_dir(&self) -> bool {
        self.kind == EntryKind::Directory
            && self.meta.as_ref().map(|m| m.is_empty_dir).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Delete,
    Protect,
    Skip,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Delete => "delete",
            Action::Protect => "protect",
            Action::Skip => "skip",
        })
    }
}

/// Closed set of reason codes a verdict can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "kebab-case")]
pub enum Reason {
    PatternMatch { pattern: String, reason: String },
    RecentFile,
    /// Modification time unavailable, so the age cannot be proven.
    AgeThresholdNotMet,
    SystemPath,
    SpecialPermission,
    StatFailure,
    EmptyDirectory,
    EmptyDirectoryDisabled,
    DirectoryNotEmpty,
    SymbolicLink,
    DuplicateOf { original: PathBuf },
    /// Kept member of a duplicate group.
    DuplicateOriginal { copies: usize },
    Eligible,
}

impl Reason {
    pub fn code(&self) -> &'static str {
        match self {
            Reason::PatternMatch { .. } => "pattern-match",
            Reason::RecentFile => "recent-file",
            Reason::AgeThresholdNotMet => "age-threshold-not-met",
            Reason::SystemPath => "system-path",
            Reason::SpecialPermission => "special-permission",
            Reason::StatFailure => "stat-failure",
            Reason::EmptyDirectory => "empty-directory",
            Reason::EmptyDirectoryDisabled => "empty-directory-disabled",
            Reason::DirectoryNotEmpty => "directory-not-empty",
            Reason::SymbolicLink => "symbolic-link",
            Reason::DuplicateOf { .. } => "duplicate-of",
            Reason::DuplicateOriginal { .. } => "duplicate-original",
            Reason::Eligible => "eligible",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::PatternMatch { pattern, reason } => {
                write!(f, "pattern-match ({}: {})", pattern, reason)
            }
            Reason::DuplicateOf { original } => write!(f, "duplicate-of-{}", original.display()),
            Reason::DuplicateOriginal { copies } => {
                write!(f, "duplicate-original ({} copies)", copies)
            }
            other => f.write_str(other.code()),
        }
    }
}

/// Decision for one candidate. Fields are private so a verdict cannot be
/// altered once the engine has produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    entry: CandidateEntry,
    action: Action,
    reason: Reason,
    simulated: bool,
}

impl Verdict {
    pub(crate) fn new(entry: CandidateEntry, action: Action, reason: Reason, simulated: bool) -> Self {
        Verdict {
            entry,
            action,
            reason,
            simulated,
        }
    }

    pub fn entry(&self) -> &CandidateEntry {
        &self.entry
    }

    pub fn path(&self) -> &Path {
        &self.entry.path
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn reason(&self) -> &Reason {
        &self.reason
    }

    pub fn simulated(&self) -> bool {
        self.simulated
    }

    /// Category as reported: duplicate and empty-directory verdicts are
    /// filed under their own buckets.
    pub fn report_category(&self) -> Category {
        match self.reason {
            Reason::DuplicateOf { .. } => Category::Duplicate,
            Reason::EmptyDirectory | Reason::EmptyDirectoryDisabled => Category::EmptyDir,
            _ => self.entry.category,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub reclaimed_bytes: u64,
    pub error: Option<String>,
    /// A filesystem mutation actually happened.
    pub executed: bool,
}

impl Outcome {
    pub fn untouched() -> Self {
        Outcome::default()
    }

    pub fn reclaimed(bytes: u64, executed: bool) -> Self {
        Outcome {
            reclaimed_bytes: bytes,
            error: None,
            executed,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Outcome {
            reclaimed_bytes: 0,
            error: Some(error.into()),
            executed: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Verdict + outcome pair handed to reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanEvent {
    pub root: PathBuf,
    pub path: PathBuf,
    pub category: Category,
    pub kind: EntryKind,
    pub action: Action,
    pub reason: Reason,
    pub bytes: u64,
    pub error: Option<String>,
    pub simulated: bool,
}

impl CleanEvent {
    pub fn new(verdict: &Verdict, outcome: &Outcome) -> Self {
        let entry = verdict.entry();
        CleanEvent {
            root: entry.root.clone(),
            path: entry.path.clone(),
            category: verdict.report_category(),
            kind: entry.kind,
            action: verdict.action(),
            reason: verdict.reason().clone(),
            bytes: outcome.reclaimed_bytes,
            error: outcome
                .error
                .clone()
                .or_else(|| entry.error.clone()),
            simulated: verdict.simulated(),
        }
    }
}
