// src/config.rs

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CleanError, Result};
use crate::file_cleaner::patterns::{ProtectionRule, RuleSet};
use crate::file_cleaner::safety::Thresholds;
use crate::file_cleaner::types::Category;
use crate::file_cleaner::walker::ScanRoot;

/// Overrides the embedded default configuration when no `--config` is given.
pub const CONFIG_ENV: &str = "DEEPCLEAN_CONFIG";

const DEFAULT_CONFIG: &str = include_str!("../rules/default_config.json");
const DEFAULT_PROTECTION_REASON: &str = "protected pattern";
/// Upper bound for `performance.hash_buffer_kb` (16 MiB).
pub const MAX_HASH_BUFFER_KB: usize = 16 * 1024;

lazy_static! {
    static ref ENV_VAR: Option<Regex> =
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").ok();
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Merge this file on top of the embedded defaults instead of replacing them.
    pub extend_defaults: bool,
    pub roots: Vec<RootConfig>,
    pub protected: Vec<ProtectedPattern>,
    pub options: OptionsConfig,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    pub category: Category,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProtectedPattern {
    Plain(String),
    Detailed {
        pattern: String,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ProtectedPattern {
    pub fn pattern(&self) -> &str {
        match self {
            ProtectedPattern::Plain(pattern) => pattern,
            ProtectedPattern::Detailed { pattern, .. } => pattern,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            ProtectedPattern::Detailed {
                reason: Some(reason),
                ..
            } => reason,
            _ => DEFAULT_PROTECTION_REASON,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    // Signed so a negative value is reported instead of failing the parse
    pub min_file_age_days: i64,
    pub clean_empty_dirs: bool,
    pub detect_duplicates: bool,
    pub min_duplicate_size: u64,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        OptionsConfig {
            min_file_age_days: i64::from(thresholds.min_file_age_days),
            clean_empty_dirs: thresholds.clean_empty_dirs,
            detect_duplicates: thresholds.detect_duplicates,
            min_duplicate_size: thresholds.min_duplicate_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub max_parallel_roots: usize, // 0: num_cpus::get()
    pub hash_buffer_kb: usize,     // Default: 64
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            max_parallel_roots: 0,
            hash_buffer_kb: 64,
        }
    }
}

/// Validated, immutable settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub roots: Vec<ScanRoot>,
    pub rules: Arc<RuleSet>,
    pub thresholds: Thresholds,
    pub parallelism: usize,
    pub hash_buffer_bytes: usize,
}

impl RunConfig {
    pub fn new(roots: Vec<ScanRoot>, rules: RuleSet, thresholds: Thresholds) -> Self {
        let performance = PerformanceConfig::default();
        RunConfig {
            roots,
            rules: Arc::new(rules),
            thresholds,
            parallelism: num_cpus::get(),
            hash_buffer_bytes: performance.hash_buffer_kb * 1024,
        }
    }
}

impl CleanerConfig {
    /// The embedded default roots and protection list.
    pub fn builtin() -> Result<Self> {
        Self::from_json(DEFAULT_CONFIG)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| CleanError::ConfigUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw)?;
        log::info!("Loaded configuration from {}", path.display());
        if config.extend_defaults {
            Ok(config.merged_over(Self::builtin()?))
        } else {
            Ok(config)
        }
    }

    /// `explicit` first, then `$DEEPCLEAN_CONFIG`, then the embedded default.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit.map(Path::to_path_buf).or_else(|| {
            env::var_os(CONFIG_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        });
        match path {
            Some(path) => Self::from_file(&path),
            None => Self::builtin(),
        }
    }

    // User roots and patterns come first; options and performance are the user's.
    fn merged_over(mut self, defaults: CleanerConfig) -> Self {
        for root in defaults.roots {
            if !self.roots.contains(&root) {
                self.roots.push(root);
            }
        }
        for pattern in defaults.protected {
            if !self.protected.contains(&pattern) {
                self.protected.push(pattern);
            }
        }
        self.extend_defaults = false;
        self
    }

    pub fn validate(&self) -> Result<RunConfig> {
        let options = &self.options;
        if options.min_file_age_days < 0 {
            return Err(CleanError::InvalidOption {
                name: "min_file_age_days",
                message: format!("must not be negative, got {}", options.min_file_age_days),
            });
        }
        let min_file_age_days =
            u32::try_from(options.min_file_age_days).map_err(|_| CleanError::InvalidOption {
                name: "min_file_age_days",
                message: format!("{} is out of range", options.min_file_age_days),
            })?;
        if !(1..=MAX_HASH_BUFFER_KB).contains(&self.performance.hash_buffer_kb) {
            return Err(CleanError::InvalidOption {
                name: "hash_buffer_kb",
                message: format!(
                    "must be between 1 and {}, got {}",
                    MAX_HASH_BUFFER_KB, self.performance.hash_buffer_kb
                ),
            });
        }

        let mut roots = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            if root.max_depth == Some(0) {
                return Err(CleanError::InvalidOption {
                    name: "max_depth",
                    message: format!("root {} would enumerate nothing", root.path),
                });
            }
            let path = expand_path(&root.path);
            if !path.is_absolute() {
                log::warn!("Ignoring root {}: not an absolute path", root.path);
                continue;
            }
            let mut scan_root = ScanRoot::new(root.category, path);
            if let Some(depth) = root.max_depth {
                scan_root = scan_root.with_max_depth(depth);
            }
            if let Some(extensions) = &root.extensions {
                scan_root = scan_root.with_extensions(extensions);
            }
            roots.push(scan_root);
        }
        if roots.is_empty() {
            return Err(CleanError::NoRoots);
        }

        let rules = self
            .protected
            .iter()
            .map(|entry| ProtectionRule::new(entry.pattern(), entry.reason()))
            .collect::<Result<Vec<_>>>()?;

        let parallelism = match self.performance.max_parallel_roots {
            0 => num_cpus::get(),
            n => n,
        };

        Ok(RunConfig {
            roots,
            rules: Arc::new(RuleSet::new(rules)),
            thresholds: Thresholds {
                min_file_age_days,
                clean_empty_dirs: options.clean_empty_dirs,
                detect_duplicates: options.detect_duplicates,
                min_duplicate_size: options.min_duplicate_size,
            },
            parallelism,
            hash_buffer_bytes: self.performance.hash_buffer_kb * 1024,
        })
    }
}

/// Expands a leading `~` and `$VAR` / `${VAR}` references. Unset variables
/// are left as written.
pub fn expand_path(raw: &str) -> PathBuf {
    expand_path_with(raw, |name| env::var(name).ok(), dirs::home_dir())
}

fn expand_path_with<F>(raw: &str, lookup: F, home: Option<PathBuf>) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = match ENV_VAR.as_ref() {
        Some(re) => re
            .replace_all(raw, |caps: &Captures| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                lookup(name).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned(),
        None => raw.to_string(),
    };

    if let Some(home) = home {
        if expanded == "~" {
            return home;
        }
        if let Some(rest) = expanded.strip_prefix("~/") {
            return home.join(rest);
        }
    }
    PathBuf::from(expanded)
}
