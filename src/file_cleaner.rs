pub mod decision;
pub mod duplicate_detector;
pub mod engine;
pub mod executor;
pub mod patterns;
mod platform;
pub mod safety;
pub mod stats;
pub mod types;
pub mod walker;


pub use decision::DecisionEngine;
pub use duplicate_detector::{DuplicateDetector, DuplicateGroup, DuplicateIndex};
pub use engine::{FileCleaner, RootSummary, RunContext, RunReport};
pub use patterns::{ProtectionRule, RuleSet};
pub use safety::{RiskLevel, Thresholds};
pub use stats::{RunStatistics, StatsSnapshot};
pub use types::{Action, CandidateEntry, Category, CleanEvent, EntryKind, Outcome, Reason, Verdict};
pub use walker::ScanRoot;
