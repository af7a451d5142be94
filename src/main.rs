//! `bytesub` runs a byte substitution pipeline described by a run config.
//!
//! **Usage:**
//! ```text
//! bytesub <CONFIG> [--log-file <path>] [--verbose] [--report <path>]
//! ```
//!
//! Prints `Done` on success. On failure prints the error category and where the
//! details were logged, and exits with status 1.

use std::path::PathBuf;
use std::process::ExitCode;

use bytesub::bridge::{self, SUCCESS_MARKER};
use bytesub::diagnostics::{self, DEFAULT_LOG_FILE};
use clap::Parser;
use colored::Colorize;
use log::LevelFilter;

/// Run a byte substitution pipeline.
#[derive(Parser)]
#[command(name = "bytesub", version = bytesub::VERSION, about = "Run a byte substitution pipeline")]
struct Args {
    /// Path to the run config (`input_file`, `output_file`, `pipeline`).
    config: PathBuf,

    /// Where diagnostics are appended.
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Log per-stage configuration and buffer growth as well.
    #[arg(short, long)]
    verbose: bool,

    /// Write a JSON run report to this path after a successful run.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(err) = diagnostics::init(Some(&args.log_file), level) {
        eprintln!(
            "{}: cannot open {}: {}",
            "diagnostics error".red(),
            args.log_file.display(),
            err
        );
        return ExitCode::FAILURE;
    }

    let outcome = bridge::run_pipeline(&args.config).and_then(|report| match &args.report {
        Some(path) => bridge::write_report(&report, path),
        None => Ok(()),
    });

    match outcome {
        Ok(()) => {
            println!("{}", SUCCESS_MARKER.green());
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!(
                "{}, see details in {}",
                err.category().label().red(),
                args.log_file.display()
            );
            ExitCode::FAILURE
        }
    }
}
