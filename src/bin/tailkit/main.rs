// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use std::time::Duration;
use tracing::metadata::LevelFilter;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use tailkit::init::args::TailArgs;
use tailkit::receivers::file::FileBufReader;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Parser)]
#[command(name = "tailkit")]
#[command(bin_name = "tailkit")]
#[command(version, about, long_about = None)]
struct Arguments {
    #[arg(value_enum, long, env = "TAILKIT_LOG_FORMAT", default_value = "text")]
    /// Log format
    log_format: LogFormatArg,

    #[arg(long, env = "TAILKIT_POLL_INTERVAL_MS", default_value = "250")]
    /// Sleep between polls when no data is available
    poll_interval_ms: u64,

    #[arg(long, env = "TAILKIT_EXIT_AFTER_IDLE")]
    /// Exit after this many consecutive empty polls
    exit_after_idle: Option<u64>,

    #[command(flatten)]
    tail: TailArgs,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    let _logger = match setup_logging(&opt.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&opt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "Failed to tail logs.");
            ExitCode::FAILURE
        }
    }
}

fn run(opt: &Arguments) -> Result<(), BoxError> {
    let config = opt.tail.build_config();
    let reader = FileBufReader::new(config)?;
    info!(path = ?reader.log_path(), "Starting tailkit.");

    let poll_interval = Duration::from_millis(opt.poll_interval_ms);
    let stdout = io::stdout();
    let mut idle = 0u64;

    loop {
        match reader.read_record() {
            Ok(Some(record)) => {
                idle = 0;
                let mut out = stdout.lock();
                out.write_all(&record.bytes)?;
                if !record.bytes.ends_with(b"\n") {
                    out.write_all(b"\n")?;
                }
                out.flush()?;
            }
            Ok(None) => {
                idle += 1;
                if opt.exit_after_idle.is_some_and(|limit| idle >= limit) {
                    info!(idle, "No more data, exiting.");
                    break;
                }
                std::thread::sleep(poll_interval);
            }
            Err(e) => {
                // Read errors are retried on the next poll
                error!(error = %e, "Failed to read record.");
                std::thread::sleep(poll_interval);
            }
        }
    }

    reader.close()?;
    let stats = reader.status();
    if stats.errors > 0 {
        info!(errors = stats.errors, last_error = %stats.last_error, "Reader errors.");
    }
    Ok(())
}

type LoggerGuard = WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(io::stderr());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    if *log_format == LogFormatArg::Json {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking_writer)
            .with_current_span(false);

        let subscriber = Registry::default().with(filter).with(json_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // Skip color codes when not in a terminal
        let use_ansi = io::stderr().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}
