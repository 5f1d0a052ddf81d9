//! # difftree CLI - report what changed in a directory tree
//!
//! Every positional argument is a directory to walk or a snapshot file
//! written by an earlier run. Each one is compared with the argument before
//! it and the differences are printed to stdout.
//!
//! ## Usage
//! ```bash
//! # Record /etc with SHA-256 digests
//! difftree -s -w etc.dt /etc
//!
//! # Later: compare the saved state with the live tree
//! difftree -s etc.dt /etc
//!
//! # Compare two trees by existence and size only
//! difftree -q /srv/www /mnt/backup/www
//! ```
//!
//! ## Exit status
//! - `0`: every argument was processed
//! - `1`: an argument could not be read or written
//! - `2`: a snapshot file is damaged or of an unknown version
//! - `3`: interrupted
//! - `4`: invalid configuration

use anyhow::{bail, Context};
use clap::Parser;
use colored::*;
use difftree::report::WriterSink;
use difftree::{
    ArgumentReport, CancelToken, DiffConfig, DiffTreeError, DigestKind, ExclusionList, RunState,
};
use humantime::format_duration;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_OK: i32 = 0;
const EXIT_IO: i32 = 1;
const EXIT_CANCELLED: i32 = 3;
const EXIT_CONFIG: i32 = 4;

/// difftree - directory tree integrity checker
#[derive(Parser)]
#[command(name = "difftree")]
#[command(version)]
#[command(about = "Record directory trees and report what changed between them")]
#[command(long_about = None)]
struct Cli {
    /// Diagnostic level (0 = warnings, 1 = info, 2 = debug, 3+ = trace)
    #[arg(short, long, value_name = "LEVEL")]
    debug: Option<u8>,

    /// Compute MD5 digests of regular files
    #[arg(short, long)]
    md5: bool,

    /// Compute SHA-256 digests of regular files
    #[arg(short, long)]
    sha256: bool,

    /// Only compare existence and size
    #[arg(short, long)]
    quick: bool,

    /// Record byte and line counts (compressed files are decompressed)
    #[arg(short, long)]
    count: bool,

    /// Also compare access times
    #[arg(short, long)]
    atime: bool,

    /// Restore access times after reading file content
    #[arg(short, long)]
    preserve_atime: bool,

    /// Leave out paths below this prefix (repeatable)
    #[arg(short, long = "exclude", value_name = "PREFIX")]
    exclude: Vec<PathBuf>,

    /// Read exclusion prefixes from a file, one per line
    #[arg(short = 'E', long, value_name = "FILE")]
    exclude_file: Option<PathBuf>,

    /// Save the snapshot of the first directory to this file
    #[arg(short, long, value_name = "FILE")]
    write: Option<PathBuf>,

    /// Load settings from a JSON file before applying flags
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directories or snapshot files to compare, in order
    #[arg(required = true, value_name = "ROOT")]
    roots: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    init_logging(config.debug_level);
    std::process::exit(run(&cli, config));
}

/// Merge the optional JSON file with the command line flags
fn build_config(cli: &Cli) -> anyhow::Result<DiffConfig> {
    let mut config = match &cli.config {
        Some(path) => DiffConfig::from_json_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => DiffConfig::default(),
    };

    if cli.md5 && cli.sha256 {
        bail!("--md5 and --sha256 cannot be used together");
    }
    if cli.md5 {
        config.digest = Some(DigestKind::Legacy16);
    } else if cli.sha256 {
        config.digest = Some(DigestKind::Strong32);
    }

    config.quick |= cli.quick;
    config.count |= cli.count;
    config.compare_atime |= cli.atime;
    config.preserve_atime |= cli.preserve_atime;

    if let Some(level) = cli.debug {
        config.debug_level = level;
    }
    if let Some(path) = &cli.write {
        config.output = Some(path.clone());
    }

    config.exclusions.extend(cli.exclude.iter().cloned().collect());
    if let Some(path) = &cli.exclude_file {
        let list = ExclusionList::load(path)
            .with_context(|| format!("failed to read exclusions from {}", path.display()))?;
        config.exclusions.extend(list);
    }

    config.normalize()?;
    Ok(config)
}

/// Install the stderr subscriber; `RUST_LOG` takes precedence over the level
fn init_logging(level: u8) {
    let default = match level {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Set `cancel` when Ctrl-C arrives
///
/// The listener runs on its own thread with a single-threaded runtime so the
/// synchronous core never has to know about it.
fn install_interrupt_handler(cancel: CancelToken) {
    let spawned = std::thread::Builder::new()
        .name("difftree-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Unable to listen for interrupts: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, finishing up");
                    cancel.cancel();
                }
            });
        });

    if let Err(e) = spawned {
        warn!("Unable to listen for interrupts: {}", e);
    }
}

fn print_error(err: &DiffTreeError) {
    eprintln!("{}: {}", "Error".red().bold(), err.user_message());
}

fn log_summary(report: &ArgumentReport, elapsed: Duration) {
    let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
    info!(
        "{}: {} records, {} added, {} changed, {} deleted, {} errors in {}",
        report.root.display(),
        report.summary.records,
        report.summary.added,
        report.summary.changed,
        report.summary.deleted,
        report.summary.errors,
        format_duration(elapsed)
    );
}

/// Process every root in order and return the exit status
fn run(cli: &Cli, config: DiffConfig) -> i32 {
    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone());

    let mut state = match RunState::new(config, cancel) {
        Ok(state) => state,
        Err(e) => {
            print_error(&e);
            return EXIT_CONFIG;
        }
    };

    let stdout = io::stdout();
    let mut sink = WriterSink::new(BufWriter::new(stdout.lock()));
    let mut status = EXIT_OK;

    for root in &cli.roots {
        let started = Instant::now();
        match state.process_argument(root, &mut sink) {
            Ok(report) => {
                log_summary(&report, started.elapsed());
                if report.outcome.is_cancelled() {
                    status = EXIT_CANCELLED;
                    break;
                }
            }
            Err(e) => {
                print_error(&e);
                status = e.exit_code();
                break;
            }
        }
    }

    if let Err(e) = sink.flush() {
        print_error(&e);
        if status == EXIT_OK {
            status = EXIT_IO;
        }
    }
    status
}
