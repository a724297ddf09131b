pub mod config;
pub mod error;
pub mod file_cleaner;
pub mod ops;
pub mod report;

pub use config::{CleanerConfig, RunConfig};
pub use error::{CleanError, Result};
pub use file_cleaner::{
    Action, Category, CleanEvent, FileCleaner, Reason, RunReport, StatsSnapshot, Verdict,
};
pub use ops::{NoopObserver, ProgressEvent, RunControl, RunObserver, RunPhase};
pub use report::EventCollector;
