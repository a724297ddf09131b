use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use deepclean_lib::config::{CleanerConfig, CONFIG_ENV};
use deepclean_lib::report::{self, EventCollector, PersistedReport};
use deepclean_lib::{Action, CleanError, FileCleaner, Reason, RunControl, RunObserver};
use lazy_static::lazy_static;
use tempfile::TempDir;

lazy_static! {
    static ref TEST_ENV_GUARD: Mutex<()> = Mutex::new(());
}

const TEST_CONFIG_JSON: &str = r#"{
    "roots": [
        {"category": "temp", "path": "~/scratch"},
        {"category": "log", "path": "$DEEPCLEAN_TEST_LOGS", "extensions": ["log"]}
    ],
    "protected": [
        {"pattern": "**/*.keep", "reason": "user-marked keep file"},
        "**/important-files/**"
    ],
    "options": {"min_file_age_days": 7, "clean_empty_dirs": true, "detect_duplicates": true}
}"#;

struct CleanerTestEnv {
    temp_home: TempDir,
    prev_home: Option<String>,
    prev_config: Option<String>,
    prev_logs: Option<String>,
}

impl CleanerTestEnv {
    fn new() -> Self {
        let temp_home = TempDir::new().expect("temp home dir");
        let config_path = temp_home.path().join("deepclean.json");
        fs::write(&config_path, TEST_CONFIG_JSON).expect("write config");
        fs::create_dir_all(temp_home.path().join("scratch")).expect("create scratch");
        fs::create_dir_all(temp_home.path().join("logs")).expect("create logs");

        let prev_home = std::env::var("HOME").ok();
        std::env::set_var("HOME", temp_home.path());

        let prev_config = std::env::var(CONFIG_ENV).ok();
        std::env::set_var(CONFIG_ENV, &config_path);

        let prev_logs = std::env::var("DEEPCLEAN_TEST_LOGS").ok();
        std::env::set_var("DEEPCLEAN_TEST_LOGS", temp_home.path().join("logs"));

        Self {
            temp_home,
            prev_home,
            prev_config,
            prev_logs,
        }
    }

    fn home(&self) -> &Path {
        self.temp_home.path()
    }

    fn scratch(&self) -> PathBuf {
        self.home().join("scratch")
    }

    fn logs(&self) -> PathBuf {
        self.home().join("logs")
    }
}

impl Drop for CleanerTestEnv {
    fn drop(&mut self) {
        restore("HOME", self.prev_home.take());
        restore(CONFIG_ENV, self.prev_config.take());
        restore("DEEPCLEAN_TEST_LOGS", self.prev_logs.take());
    }
}

fn restore(key: &str, previous: Option<String>) {
    match previous {
        Some(value) => std::env::set_var(key, value),
        None => std::env::remove_var(key),
    }
}

fn guard() -> std::sync::MutexGuard<'static, ()> {
    TEST_ENV_GUARD
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_aged(path: &Path, contents: &[u8], days: u64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
    let when = SystemTime::now() - Duration::from_secs(days * 86_400);
    fs::File::open(path)
        .and_then(|file| file.set_modified(when))
        .expect("set mtime");
}

fn populate(env: &CleanerTestEnv) {
    let scratch = env.scratch();
    write_aged(&scratch.join("build.tmp"), b"stale build output", 30);
    write_aged(&scratch.join("today.tmp"), b"still in use", 0);
    write_aged(&scratch.join("notes.keep"), b"do not touch", 60);
    write_aged(&scratch.join("important-files/ledger.bin"), b"ledger", 60);
    write_aged(&scratch.join("copies/a.bin"), b"same same same", 50);
    write_aged(&scratch.join("copies/b.bin"), b"same same same", 40);
    fs::create_dir_all(scratch.join("vacant")).expect("create vacant");
    for dir in ["vacant", "copies", "important-files"] {
        let when = SystemTime::now() - Duration::from_secs(30 * 86_400);
        fs::File::open(scratch.join(dir))
            .and_then(|file| file.set_modified(when))
            .expect("age dir");
    }

    write_aged(&env.logs().join("app.log"), b"old log", 20);
    write_aged(&env.logs().join("app.cfg"), b"not a log", 20);
}

fn load_cleaner(explicit: Option<&Path>) -> FileCleaner {
    let config = CleanerConfig::load(explicit).expect("load config");
    FileCleaner::new(config.validate().expect("valid config"))
}

#[test]
fn test_env_config_drives_full_run() {
    let _guard = guard();
    let env = CleanerTestEnv::new();
    populate(&env);

    let cleaner = load_cleaner(None);
    assert_eq!(cleaner.config().roots[0].path, env.scratch());
    assert_eq!(cleaner.config().roots[1].path, env.logs());

    let collector = EventCollector::new();
    let report = cleaner
        .run(false, &RunControl::new(), &collector)
        .expect("run succeeds");
    let events = collector.events();
    let scratch = env.scratch();

    assert!(!scratch.join("build.tmp").exists());
    assert!(!scratch.join("copies/b.bin").exists());
    assert!(!scratch.join("vacant").exists());
    assert!(!env.logs().join("app.log").exists());
    assert!(scratch.join("today.tmp").exists());
    assert!(scratch.join("notes.keep").exists());
    assert!(scratch.join("important-files/ledger.bin").exists());
    assert!(scratch.join("copies/a.bin").exists());
    assert!(env.logs().join("app.cfg").exists());
    assert!(!events.iter().any(|e| e.path == env.logs().join("app.cfg")));

    let ledger = events
        .iter()
        .find(|e| e.path == scratch.join("important-files/ledger.bin"))
        .expect("ledger evaluated");
    assert_eq!(ledger.action, Action::Protect);
    assert!(matches!(ledger.reason, Reason::PatternMatch { .. }));

    assert!(!report.simulated);
    assert!(!report.cancelled);
    assert_eq!(report.roots.len(), 2);
    assert_eq!(report.duplicate_groups.len(), 1);
    assert_eq!(report.stats.cleaned_files, 3);
    assert_eq!(report.stats.cleaned_dirs, 1);
    assert_eq!(report.stats.errors, 0);
    assert!(events.iter().all(|e| e.action != Action::Delete || e.error.is_none()));
}

#[test]
fn test_explicit_config_beats_env() {
    let _guard = guard();
    let env = CleanerTestEnv::new();
    let other = env.home().join("other");
    fs::create_dir_all(&other).expect("create other");
    let explicit = env.home().join("explicit.json");
    fs::write(
        &explicit,
        format!(
            r#"{{"roots": [{{"category": "custom", "path": "{}"}}]}}"#,
            other.display()
        ),
    )
    .expect("write explicit config");

    let cleaner = load_cleaner(Some(&explicit));
    assert_eq!(cleaner.config().roots.len(), 1);
    assert_eq!(cleaner.config().roots[0].path, other);
    assert!(cleaner.config().rules.is_empty());
}

#[test]
fn test_unreadable_config_is_fatal() {
    let _guard = guard();
    let env = CleanerTestEnv::new();
    let missing = env.home().join("nope.json");

    let result = CleanerConfig::load(Some(&missing));
    assert!(matches!(result, Err(CleanError::ConfigUnreadable { .. })));
}

#[test]
fn test_invalid_pattern_is_fatal() {
    let _guard = guard();
    let config = CleanerConfig::from_json(
        r#"{"roots": [{"category": "temp", "path": "/tmp"}], "protected": ["**/[unclosed"]}"#,
    )
    .expect("parse config");
    assert!(matches!(
        config.validate(),
        Err(CleanError::InvalidPattern { .. })
    ));
}

#[test]
fn test_no_existing_roots_is_fatal() {
    let _guard = guard();
    let temp = TempDir::new().expect("temp dir");
    let config = CleanerConfig::from_json(&format!(
        r#"{{"roots": [{{"category": "cache", "path": "{}"}}]}}"#,
        temp.path().join("gone").display()
    ))
    .expect("parse config");
    let cleaner = FileCleaner::new(config.validate().expect("valid config"));

    let result = cleaner.run(true, &RunControl::new(), &EventCollector::new());
    assert!(matches!(result, Err(CleanError::NoRoots)));
}

#[test]
fn test_report_written_after_dry_run() {
    let _guard = guard();
    let env = CleanerTestEnv::new();
    populate(&env);

    let collector = EventCollector::new();
    let run = load_cleaner(None)
        .run(true, &RunControl::new(), &collector)
        .expect("dry run");
    assert!(env.scratch().join("build.tmp").exists());

    let report_dir = env.home().join("reports");
    let path = report::write_report(&report_dir, &run, collector.events()).expect("write report");
    let persisted: PersistedReport =
        serde_json::from_str(&fs::read_to_string(&path).expect("read report")).expect("parse");

    assert!(persisted.report.simulated);
    assert_eq!(persisted.report.run_id, run.run_id);
    assert_eq!(persisted.events.len(), collector.len());
    assert_eq!(persisted.categories["duplicate"].deleted, 1);
    assert_eq!(persisted.categories["empty_dir"].deleted, 1);

    let summary = report::format_summary(&run);
    assert!(summary.contains("Would free"));
}

#[tokio::test]
async fn test_run_async_collects_events() {
    let _guard = guard();
    let temp = TempDir::new().expect("temp dir");
    write_aged(&temp.path().join("old.tmp"), b"stale", 30);
    let config = CleanerConfig::from_json(&format!(
        r#"{{"roots": [{{"category": "temp", "path": "{}"}}]}}"#,
        temp.path().display()
    ))
    .expect("parse config");
    let cleaner = Arc::new(FileCleaner::new(config.validate().expect("valid config")));

    let collector = Arc::new(EventCollector::new());
    let observer: Arc<dyn RunObserver> = collector.clone();
    let report = cleaner
        .run_async(false, RunControl::new(), observer)
        .await
        .expect("async run");

    assert_eq!(report.stats.cleaned_files, 1);
    assert_eq!(collector.len(), 1);
    assert!(!temp.path().join("old.tmp").exists());
}

#[tokio::test]
async fn test_cancelled_token_stops_async_run() {
    let _guard = guard();
    let temp = TempDir::new().expect("temp dir");
    write_aged(&temp.path().join("old.tmp"), b"stale", 30);
    let config = CleanerConfig::from_json(&format!(
        r#"{{"roots": [{{"category": "temp", "path": "{}"}}]}}"#,
        temp.path().display()
    ))
    .expect("parse config");
    let cleaner = Arc::new(FileCleaner::new(config.validate().expect("valid config")));

    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();
    let report = cleaner
        .run_async(false, RunControl::from_token(token), Arc::new(EventCollector::new()))
        .await
        .expect("cancelled run still reports");

    assert!(report.cancelled);
    assert_eq!(report.stats.analyzed, 0);
    assert!(temp.path().join("old.tmp").exists());
}
