use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::platform;
use super::types::{CandidateEntry, Category, EntryKind, EntryMeta};
use crate::ops::RunControl;

pub const DEFAULT_MAX_DEPTH: usize = 64;

/// A resolved root with its category tag and optional filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRoot {
    pub category: Category,
    pub path: PathBuf,
    pub max_depth: Option<usize>,
    /// Lowercase extensions without the leading dot; files outside the list
    /// are not candidates. Directories are always enumerated.
    pub extensions: Option<Vec<String>>,
}

impl ScanRoot {
    pub fn new(category: Category, path: impl Into<PathBuf>) -> Self {
        ScanRoot {
            category,
            path: path.into(),
            max_depth: None,
            extensions: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = Some(
            extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        );
        self
    }

    /// Lazy depth-first sequence of candidates. Each call starts afresh.
    pub fn walk<'a>(&'a self, control: Option<&'a RunControl>) -> RootWalk<'a> {
        let inner = WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH))
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        RootWalk {
            root: self,
            inner,
            control,
            failed_dirs: HashSet::new(),
            cancelled: false,
        }
    }

    /// Whether a walk of this root yields `entry`. Error entries are reported
    /// regardless of the extension filter, so they only need the depth check.
    pub fn covers(&self, entry: &CandidateEntry) -> bool {
        let relative = match entry.path.strip_prefix(&self.path) {
            Ok(relative) => relative,
            Err(_) => return false,
        };
        let depth = relative.components().count();
        if depth == 0 || depth > self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH) {
            return false;
        }
        entry.kind != EntryKind::File || entry.meta.is_none() || self.accepts_file(&entry.path)
    }

    fn accepts_file(&self, path: &Path) -> bool {
        let exts = match self.extensions.as_ref() {
            Some(exts) if !exts.is_empty() => exts,
            _ => return true,
        };
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_lowercase(),
            None => return false,
        };
        exts.iter().any(|ext| name.ends_with(&format!(".{}", ext)))
    }
}

pub struct RootWalk<'a> {
    root: &'a ScanRoot,
    inner: walkdir::IntoIter,
    control: Option<&'a RunControl>,
    /// Directories already reported as error entries.
    failed_dirs: HashSet<PathBuf>,
    cancelled: bool,
}

impl<'a> RootWalk<'a> {
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    fn candidate(&mut self, dent: DirEntry) -> Option<CandidateEntry> {
        let path = dent.path().to_path_buf();
        let file_type = dent.file_type();

        let metadata = match dent.metadata() {
            Ok(md) => md,
            Err(err) => return Some(self.error_entry(path, file_type.is_dir(), err.to_string())),
        };

        if file_type.is_symlink() {
            return Some(self.entry(path, EntryKind::Symlink, &metadata, false));
        }

        if file_type.is_dir() {
            return match fs::read_dir(&path) {
                Ok(mut children) => {
                    let empty = children.next().is_none();
                    Some(self.entry(path, EntryKind::Directory, &metadata, empty))
                }
                Err(err) => {
                    self.failed_dirs.insert(path.clone());
                    Some(self.error_entry(path, true, err.to_string()))
                }
            };
        }

        if !self.root.accepts_file(&path) {
            return None;
        }
        Some(self.entry(path, EntryKind::File, &metadata, false))
    }

    fn entry(
        &self,
        path: PathBuf,
        kind: EntryKind,
        metadata: &Metadata,
        is_empty_dir: bool,
    ) -> CandidateEntry {
        let size = match kind {
            EntryKind::Directory => 0,
            _ => metadata.len(),
        };
        let meta = EntryMeta {
            size,
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            mode: platform::raw_mode(metadata),
            immutable: kind != EntryKind::Symlink && platform::is_immutable(&path, metadata),
            is_empty_dir,
        };
        CandidateEntry {
            path,
            root: self.root.path.clone(),
            kind,
            category: self.root.category,
            meta: Some(meta),
            error: None,
        }
    }

    fn error_entry(&self, path: PathBuf, is_dir: bool, error: String) -> CandidateEntry {
        log::warn!("Cannot read {}: {}", path.display(), error);
        CandidateEntry {
            path,
            root: self.root.path.clone(),
            kind: if is_dir {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            category: Category::Error,
            meta: None,
            error: Some(error),
        }
    }
}

impl<'a> Iterator for RootWalk<'a> {
    type Item = CandidateEntry;

    fn next(&mut self) -> Option<CandidateEntry> {
        loop {
            if self.control.map(|c| c.is_cancelled()).unwrap_or(false) {
                self.cancelled = true;
                return None;
            }
            match self.inner.next()? {
                Ok(dent) => {
                    if let Some(candidate) = self.candidate(dent) {
                        return Some(candidate);
                    }
                }
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.path.clone());
                    if self.failed_dirs.contains(&path) {
                        continue;
                    }
                    let is_dir = fs::symlink_metadata(&path)
                        .map(|md| md.is_dir())
                        .unwrap_or(false);
                    return Some(self.error_entry(path, is_dir, err.to_string()));
                }
            }
        }
    }
}

/// Fully materialized enumeration of one root.
#[derive(Debug, Clone)]
pub struct WalkResult {
    pub root: ScanRoot,
    pub entries: Vec<CandidateEntry>,
    pub errors: usize,
    pub bytes: u64,
    pub cancelled: bool,
}

pub fn walk_root(root: &ScanRoot, control: Option<&RunControl>) -> WalkResult {
    let mut walk = root.walk(control);
    let entries: Vec<CandidateEntry> = walk.by_ref().collect();
    let cancelled = walk.was_cancelled();

    let errors = entries.iter().filter(|e| e.meta.is_none()).count();
    let bytes = entries.iter().map(CandidateEntry::size).sum();
    log::debug!(
        "Enumerated {} entries ({} errors) under {}",
        entries.len(),
        errors,
        root.path.display()
    );

    WalkResult {
        root: root.clone(),
        entries,
        errors,
        bytes,
        cancelled,
    }
}

/// Walks every root, in parallel when `parallel-scan` is enabled. `on_root`
/// fires as each root finishes; output is in root order regardless of
/// scheduling.
pub fn walk_roots<F>(roots: &[ScanRoot], control: Option<&RunControl>, on_root: F) -> Vec<WalkResult>
where
    F: Fn(&WalkResult) + Sync,
{
    let walk = |root: &ScanRoot| {
        let result = walk_root(root, control);
        on_root(&result);
        result
    };

    #[cfg(feature = "parallel-scan")]
    {
        use rayon::prelude::*;
        roots.par_iter().map(walk).collect()
    }

    #[cfg(not(feature = "parallel-scan"))]
    {
        roots.iter().map(walk).collect()
    }
}

/// Drops entries that one of the `earlier` roots also enumerates, so the
/// first root in configuration order owns every path.
pub fn drop_covered(result: &mut WalkResult, earlier: &[ScanRoot]) -> usize {
    let before = result.entries.len();
    result
        .entries
        .retain(|entry| !earlier.iter().any(|root| root.covers(entry)));
    let dropped = before - result.entries.len();
    if dropped > 0 {
        result.errors = result.entries.iter().filter(|e| e.meta.is_none()).count();
        result.bytes = result.entries.iter().map(CandidateEntry::size).sum();
    }
    dropped
}

/// Applies [`drop_covered`] to every result against the roots before it.
pub fn dedupe_overlapping(results: &mut [WalkResult]) -> usize {
    let roots: Vec<ScanRoot> = results.iter().map(|result| result.root.clone()).collect();
    results
        .iter_mut()
        .enumerate()
        .map(|(position, result)| drop_covered(result, &roots[..position]))
        .sum()
}
