//! `skywatch` command-line entry point.
//!
//! Replays a JSON-lines detection feed (a file or stdin) into a history
//! directory. Stops on end of input or Ctrl-C, archiving every open
//! flight before exiting.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use skywatch::prelude::*;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Record drone detections into weekly flight-history files.
#[derive(Debug, Parser)]
#[command(name = "skywatch", version, about)]
struct Cli {
    /// JSON-lines file of detections. Reads stdin when omitted.
    input: Option<PathBuf>,

    /// Directory holding the weekly bucket files.
    #[arg(long, env = "SKYWATCH_HISTORY_DIR", default_value = "history")]
    history_dir: PathBuf,

    /// Idle time (ms) after which a flight is archived.
    #[arg(long, env = "SKYWATCH_INACTIVE_TIMEOUT_MS", default_value_t = 10_000)]
    inactive_timeout_ms: u64,

    /// Maximum trace points kept per session.
    #[arg(long, env = "SKYWATCH_MAX_TRACE_LENGTH", default_value_t = 500)]
    max_trace_length: usize,

    /// Archiving sweep period (ms). 0 disables the periodic sweep.
    #[arg(long, env = "SKYWATCH_ARCHIVE_INTERVAL_MS", default_value_t = 15_000)]
    archive_interval_ms: u64,

    /// Time (ms) allowed for the final archive and flush.
    #[arg(long, env = "SKYWATCH_SHUTDOWN_BUDGET_MS", default_value_t = 5_000)]
    shutdown_budget_ms: u64,

    /// Print every bucket-updated event to stdout as one JSON line.
    #[arg(long)]
    print_events: bool,
}

impl Cli {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            history_dir: self.history_dir.clone(),
            session: SessionConfig {
                inactive_timeout: Duration::from_millis(self.inactive_timeout_ms),
                max_trace_length: self.max_trace_length,
                archive_check_interval: Duration::from_millis(self.archive_interval_ms),
            },
            shutdown_budget: Duration::from_millis(self.shutdown_budget_ms),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "skywatch stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), SkywatchError> {
    let notifier = BroadcastNotifier::default();
    if cli.print_events {
        let mut events = notifier.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "failed to encode event"),
                }
            }
        });
    }

    let service = HistoryService::builder()
        .config(cli.service_config())
        .build(notifier);

    let (tx, rx) = mpsc::channel(1024);
    let reader = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|source| SkywatchError::Input {
                    path: path.clone(),
                    source,
                })?;
            info!(path = %path.display(), "replaying detections from file");
            tokio::spawn(feed(BufReader::new(file), tx))
        }
        None => {
            info!("reading detections from stdin");
            tokio::spawn(feed(BufReader::new(tokio::io::stdin()), tx))
        }
    };

    let result = service
        .run(rx, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C, waiting for end of input");
                std::future::pending::<()>().await;
            }
        })
        .await;

    reader.abort();
    result
}

/// Parses one detection per line and forwards it. Blank lines are
/// skipped; malformed lines are logged and skipped.
async fn feed(input: impl AsyncBufRead + Unpin, tx: mpsc::Sender<Detection>) {
    let mut lines = input.lines();
    let mut line_no = 0u64;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read detection feed");
                break;
            }
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Detection>(&line) {
            Ok(detection) => {
                if tx.send(detection).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(line = line_no, error = %e, "skipping malformed detection"),
        }
    }
}
