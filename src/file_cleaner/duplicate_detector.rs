use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use super::types::{CandidateEntry, EntryKind};
use crate::ops::RunControl;

const DEFAULT_HASH_BUFFER_BYTES: usize = 64 * 1024;
const MAX_HASH_BUFFER_BYTES: usize = 16 * 1024 * 1024;

/// Files sharing one content fingerprint. `original` is the member that is
/// kept; `duplicates` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub fingerprint: String,
    pub size: u64,
    pub original: PathBuf,
    pub duplicates: Vec<PathBuf>,
}

impl DuplicateGroup {
    pub fn len(&self) -> usize {
        self.duplicates.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn reclaimable_bytes(&self) -> u64 {
        self.size * self.duplicates.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct DuplicateScanResult {
    pub groups: Vec<DuplicateGroup>,
    pub analyzed_files: usize,
    pub skipped_files: usize,
    pub failures: Vec<HashFailure>,
    pub cancelled: bool,
}

pub struct DuplicateDetector {
    min_size: u64,
    buffer_size: usize,
}

struct Member<'a> {
    path: &'a Path,
    modified: Option<DateTime<Utc>>,
}

struct BucketResult {
    groups: Vec<DuplicateGroup>,
    hashed: usize,
    failures: Vec<HashFailure>,
    cancelled: bool,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self {
            min_size: 1,
            buffer_size: DEFAULT_HASH_BUFFER_BYTES,
        }
    }

    pub fn with_min_size(mut self, min_size: u64) -> Self {
        // zero-length files are never grouped
        self.min_size = min_size.max(1);
        self
    }

    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes.clamp(4096, MAX_HASH_BUFFER_BYTES);
        self
    }

    /// Size pre-filter, then whole-file SHA-256 within each size bucket.
    /// The result is fully materialized before returning.
    pub fn group<'a, I>(&self, entries: I, control: Option<&RunControl>) -> DuplicateScanResult
    where
        I: IntoIterator<Item = &'a CandidateEntry>,
    {
        let mut result = DuplicateScanResult::default();

        let mut size_buckets: HashMap<u64, Vec<Member<'_>>> = HashMap::new();
        for entry in entries {
            let meta = match (entry.kind, entry.meta.as_ref()) {
                (EntryKind::File, Some(meta)) => meta,
                _ => continue,
            };
            if meta.size < self.min_size {
                result.skipped_files += 1;
                continue;
            }
            size_buckets.entry(meta.size).or_default().push(Member {
                path: &entry.path,
                modified: meta.modified,
            });
        }

        let mut buckets: Vec<(u64, Vec<Member<'_>>)> = size_buckets
            .into_iter()
            .filter(|(_, members)| members.len() >= 2)
            .collect();
        buckets.sort_by(|a, b| b.0.cmp(&a.0));

        #[cfg(feature = "parallel-scan")]
        let bucket_results: Vec<BucketResult> = {
            use rayon::prelude::*;
            buckets
                .par_iter()
                .map(|(size, members)| self.group_bucket(*size, members, control))
                .collect()
        };

        #[cfg(not(feature = "parallel-scan"))]
        let bucket_results: Vec<BucketResult> = buckets
            .iter()
            .map(|(size, members)| self.group_bucket(*size, members, control))
            .collect();

        for bucket in bucket_results {
            result.analyzed_files += bucket.hashed;
            result.failures.extend(bucket.failures);
            result.groups.extend(bucket.groups);
            result.cancelled |= bucket.cancelled;
        }

        result.groups.sort_by(|a, b| a.original.cmp(&b.original));
        result.failures.sort_by(|a, b| a.path.cmp(&b.path));
        result
    }

    fn group_bucket(
        &self,
        size: u64,
        members: &[Member<'_>],
        control: Option<&RunControl>,
    ) -> BucketResult {
        let mut out = BucketResult {
            groups: Vec::new(),
            hashed: 0,
            failures: Vec::new(),
            cancelled: false,
        };
        let mut by_fingerprint: BTreeMap<String, Vec<&Member<'_>>> = BTreeMap::new();

        for member in members {
            if control.map(|c| c.is_cancelled()).unwrap_or(false) {
                out.cancelled = true;
                return out;
            }
            match self.fingerprint(member.path, size) {
                Ok(fingerprint) => {
                    out.hashed += 1;
                    by_fingerprint.entry(fingerprint).or_default().push(member);
                }
                Err(err) => {
                    log::warn!(
                        "Unable to hash {} during duplicate detection: {}",
                        member.path.display(),
                        err
                    );
                    out.failures.push(HashFailure {
                        path: member.path.to_path_buf(),
                        error: err.to_string(),
                    });
                }
            }
        }

        for (fingerprint, mut files) in by_fingerprint {
            if files.len() < 2 {
                continue;
            }
            // earliest mtime is kept; lexicographically smallest path breaks ties
            files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(b.path)));
            let original = files[0].path.to_path_buf();
            let duplicates = files[1..].iter().map(|m| m.path.to_path_buf()).collect();
            out.groups.push(DuplicateGroup {
                fingerprint,
                size,
                original,
                duplicates,
            });
        }
        out
    }

    fn fingerprint(&self, path: &Path, expected_size: u64) -> io::Result<String> {
        let mut file = fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.buffer_size];
        let mut total = 0u64;
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            total += read as u64;
            hasher.update(&buffer[..read]);
        }
        if total != expected_size {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("file changed during scan ({} -> {} bytes)", expected_size, total),
            ));
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Original { copies: usize },
    DuplicateOf(PathBuf),
}

/// Path lookup over a materialized set of groups.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    members: HashMap<PathBuf, Membership>,
}

impl DuplicateIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_groups(groups: &[DuplicateGroup]) -> Self {
        let mut members = HashMap::new();
        for group in groups {
            members.insert(
                group.original.clone(),
                Membership::Original {
                    copies: group.duplicates.len(),
                },
            );
            for dup in &group.duplicates {
                members.insert(dup.clone(), Membership::DuplicateOf(group.original.clone()));
            }
        }
        Self { members }
    }

    pub fn lookup(&self, path: &Path) -> Option<&Membership> {
        self.members.get(path)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
