mod cli;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use cli::Cli;
use deepclean_lib::config::CleanerConfig;
use deepclean_lib::report::{self, EventCollector};
use deepclean_lib::{CleanError, FileCleaner, RunControl, RunObserver};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_logger(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logger(verbose: bool) {
    // RUST_LOG wins over --verbose
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();
}

async fn run(args: Cli) -> deepclean_lib::Result<()> {
    let mut config = CleanerConfig::load(args.config.as_deref())?;
    args.apply(&mut config.options);
    let run_config = config.validate()?;
    let cleaner = Arc::new(FileCleaner::new(run_config));

    let control = RunControl::new();
    let interrupt = {
        let control = control.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, stopping after the current entry");
                control.cancel();
            }
        })
    };

    let collector = Arc::new(EventCollector::new());
    let observer: Arc<dyn RunObserver> = collector.clone();
    let outcome = cleaner.run_async(args.dry_run, control, observer).await;
    interrupt.abort();
    let run_report = outcome?;

    println!("{}", report::format_summary(&run_report));

    if args.generate_report {
        let dir = args
            .report_dir
            .clone()
            .or_else(report::default_report_dir)
            .ok_or(CleanError::InvalidOption {
                name: "report_dir",
                message: "no data directory on this platform; pass --report-dir".into(),
            })?;
        let path = report::write_report(&dir, &run_report, collector.events())?;
        println!("Report: {}", path.display());
    }
    Ok(())
}
