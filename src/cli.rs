use clap::Parser;
use std::path::PathBuf;

use deepclean_lib::config::OptionsConfig;

#[derive(Debug, Parser)] // requires `derive` feature
#[command(name = "deepclean")]
#[command(about = "Remove caches, temp files, logs and duplicates without touching anything important", long_about = None)]
pub struct Cli {
    /// Simulate without deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Configuration file (falls back to $DEEPCLEAN_CONFIG, then the built-in defaults)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Minimum age of files to delete, in days
    #[arg(long, value_name = "DAYS", allow_negative_numbers = true)]
    pub min_file_age: Option<i64>,

    /// Delete empty directories
    #[arg(long)]
    pub clean_empty_dirs: bool,

    /// Detect duplicate files and delete the redundant copies
    #[arg(long)]
    pub detect_duplicates: bool,

    /// Write a JSON report after the run
    #[arg(long)]
    pub generate_report: bool,

    /// Where to write the report (default: <data dir>/deepclean/reports)
    #[arg(long, value_name = "DIR")]
    pub report_dir: Option<PathBuf>,

    /// Log every verdict
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Flags given on the command line win over the configuration file.
    pub fn apply(&self, options: &mut OptionsConfig) {
        if let Some(days) = self.min_file_age {
            options.min_file_age_days = days;
        }
        if self.clean_empty_dirs {
            options.clean_empty_dirs = true;
        }
        if self.detect_duplicates {
            options.detect_duplicates = true;
        }
    }
}
