//! wsmeterd - workspace storage usage sampler daemon.
//!
//! Measures every workspace directory under a root at a fixed cadence and
//! publishes one usage sample per workspace as a JSON line.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use wsmeter_core::fmt::format_duration;
use wsmeter_core::{
    DuMeasurer, JsonLinesGateway, PublicationGateway, RunOutcome, Scheduler, SchedulerConfig,
    SchedulerError,
};

/// Exit status when a cycle had a permanent failure.
const EXIT_PERMANENT_FAILURE: i32 = 1;
/// Exit status for configuration errors.
const EXIT_CONFIG: i32 = 2;

/// Workspace storage usage sampler.
#[derive(Parser, Debug)]
#[command(name = "wsmeterd", about = "Workspace storage usage sampler", version)]
struct Args {
    /// Directory whose immediate subdirectories are workspaces.
    #[arg(env = "WSMETER_ROOT")]
    root: PathBuf,

    /// Target interval between scans in seconds.
    #[arg(
        short,
        long,
        env = "WSMETER_INTERVAL",
        default_value = "3600",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: u64,

    /// Run a single scan and exit.
    #[arg(long)]
    once: bool,

    /// Append samples to this file as JSON lines instead of stdout.
    #[arg(short, long, env = "WSMETER_OUTPUT", value_name = "PATH")]
    output: Option<PathBuf>,

    /// `du` binary used to measure workspaces.
    #[arg(long, default_value = "du", value_name = "PATH")]
    du_path: String,

    /// Timeout for measuring a single workspace, in seconds.
    #[arg(
        long,
        default_value = "1800",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    measure_timeout: u64,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Logs go to stderr; stdout may carry samples.
fn init_logging(verbose: u8, quiet: bool) {
    let level = log_level(verbose, quiet);

    let mut filter = EnvFilter::from_default_env();
    for target in ["wsmeterd", "wsmeter_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn log_level(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Opens the sample sink selected on the command line.
fn open_gateway(output: Option<&PathBuf>) -> std::io::Result<Box<dyn PublicationGateway>> {
    Ok(match output {
        Some(path) => Box::new(JsonLinesGateway::append(path)?),
        None => Box::new(JsonLinesGateway::stdout()),
    })
}

fn exit_code(err: &SchedulerError) -> i32 {
    match err {
        SchedulerError::PermanentFailure { .. } => EXIT_PERMANENT_FAILURE,
        SchedulerError::Discover(_) => EXIT_CONFIG,
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("wsmeterd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Monitoring {} with target interval {} seconds",
        args.root.display(),
        args.interval
    );

    if !args.root.is_dir() {
        error!(
            "Workspace root {} does not exist or is not a directory",
            args.root.display()
        );
        process::exit(EXIT_CONFIG);
    }

    let measurer = DuMeasurer::new()
        .with_program(args.du_path.clone())
        .with_timeout(Duration::from_secs(args.measure_timeout));
    info!(
        "Measuring with {} (timeout {})",
        measurer.program(),
        format_duration(measurer.timeout())
    );

    let mut gateway = match open_gateway(args.output.as_ref()) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Failed to open sample output: {}", e);
            process::exit(EXIT_CONFIG);
        }
    };
    match &args.output {
        Some(path) => info!("Publishing samples to {}", path.display()),
        None => info!("Publishing samples to stdout"),
    }

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    let config = SchedulerConfig::new(args.root)
        .with_interval(Duration::from_secs(args.interval))
        .once(args.once);
    let mut scheduler = Scheduler::new(config, measurer);

    let outcome = scheduler.run(gateway.as_mut(), &running);

    if let Err(e) = gateway.flush() {
        warn!("Failed to flush sample output: {}", e);
    }
    drop(gateway);

    match outcome {
        Ok(RunOutcome::Completed) => info!("Single scan complete"),
        Ok(RunOutcome::Stopped) => info!("Shutdown complete"),
        Err(e) => {
            error!("Fatal: {}", e);
            process::exit(exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsmeter_core::DiscoverError;

    #[test]
    fn args_defaults() {
        let args = Args::try_parse_from(["wsmeterd", "/srv/workspaces"]).unwrap();
        assert_eq!(args.root, PathBuf::from("/srv/workspaces"));
        assert_eq!(args.interval, 3600);
        assert!(!args.once);
        assert_eq!(args.output, None);
        assert_eq!(args.du_path, "du");
        assert_eq!(args.measure_timeout, 1800);
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn args_full() {
        let args = Args::try_parse_from([
            "wsmeterd",
            "-vv",
            "--interval",
            "60",
            "--once",
            "-o",
            "/tmp/samples.jsonl",
            "--measure-timeout",
            "5",
            "/data",
        ])
        .unwrap();
        assert_eq!(args.interval, 60);
        assert!(args.once);
        assert_eq!(args.output, Some(PathBuf::from("/tmp/samples.jsonl")));
        assert_eq!(args.measure_timeout, 5);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn args_reject_zero_interval() {
        assert!(Args::try_parse_from(["wsmeterd", "--interval", "0", "/data"]).is_err());
    }

    #[test]
    fn log_level_from_flags() {
        assert_eq!(log_level(0, false), Level::INFO);
        assert_eq!(log_level(1, false), Level::DEBUG);
        assert_eq!(log_level(5, false), Level::TRACE);
        assert_eq!(log_level(2, true), Level::ERROR);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(
            exit_code(&SchedulerError::PermanentFailure { failed: 3 }),
            EXIT_PERMANENT_FAILURE
        );
        assert_eq!(
            exit_code(&SchedulerError::Discover(DiscoverError::NotADirectory(
                PathBuf::from("/missing")
            ))),
            EXIT_CONFIG
        );
    }
}
