//! confcache - command-line tool for the conference data cache.
//!
//! Syncs the configured tables into the local cache and reports on its
//! state. Record contents are never printed.

use std::io;

use anyhow::{bail, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use confcache_core::sync::TableStatus;
use confcache_core::{ConferenceService, Config};

const USAGE: &str = "\
Usage: confcache [--log-file] <command>

Commands:
  sync           Fetch every configured table into the cache
  status         Show age, classification and record count per table
  diagnostics    Print the health snapshot as JSON
  clear          Remove every cached entry
  show <table>   Read one table through the cache and print its record count";

enum Command {
    Sync,
    Status,
    Diagnostics,
    Clear,
    Show(String),
}

fn parse_args(args: &[String]) -> Result<(Command, bool)> {
    let mut log_file = false;
    let mut rest = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--log-file" => log_file = true,
            "-h" | "--help" => bail!("{}", USAGE),
            _ => rest.push(arg.as_str()),
        }
    }

    let command = match rest.as_slice() {
        ["sync"] => Command::Sync,
        ["status"] | [] => Command::Status,
        ["diagnostics"] => Command::Diagnostics,
        ["clear"] => Command::Clear,
        ["show", table] => Command::Show(table.to_string()),
        _ => bail!("{}", USAGE),
    };
    Ok((command, log_file))
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, filtered by `RUST_LOG` (default `warn`). With
/// `log_file`, a daily rolling file under the cache directory is added.
fn init_tracing(config: &Config, log_file: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file.then(|| config.cache_dir()) {
        Some(Ok(dir)) => {
            let appender = tracing_appender::rolling::daily(dir.join("logs"), "confcache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Some(Err(e)) => {
            eprintln!("Warning: file logging disabled: {}", e);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, log_file) = parse_args(&args)?;

    let config = Config::load()?;
    let _guard = init_tracing(&config, log_file);
    info!("confcache starting");

    let service = ConferenceService::from_config(&config)?;

    match command {
        Command::Sync => run_sync(&service).await,
        Command::Status => {
            print_status(&service.status().await);
            Ok(())
        }
        Command::Diagnostics => {
            println!("{}", serde_json::to_string_pretty(&service.diagnostics())?);
            Ok(())
        }
        Command::Clear => match service.clear_cache().await.into_result() {
            Ok(()) => {
                println!("Cache cleared");
                Ok(())
            }
            Err(e) => bail!("Failed to clear cache: {}", e),
        },
        Command::Show(table) => run_show(&service, &table).await,
    }
}

async fn run_sync(service: &ConferenceService) -> Result<()> {
    if !service.orchestrator().is_online() {
        eprintln!("Offline: no remote configured or offline mode enabled");
    }

    let result = service.sync_all().await;
    for table in result.synced_tables() {
        println!("  ok      {}", table);
    }
    for error in result.errors() {
        println!("  failed  {}", error);
    }
    println!(
        "Synced {}/{} tables, {} records",
        result.synced_tables().len(),
        service.orchestrator().tables().len(),
        result.total_records()
    );

    if !result.success() {
        bail!("{} table(s) failed to sync", result.errors().len());
    }
    Ok(())
}

async fn run_show(service: &ConferenceService, table: &str) -> Result<()> {
    if !service.orchestrator().tables().iter().any(|t| t == table) {
        bail!("Unknown table: {}", table);
    }

    let result = service.get_records(table).await;
    match result.into_result() {
        Ok(records) => {
            let state = service.boundary().state(table);
            println!("{}: {} records ({:?})", table, records.len(), state);
            Ok(())
        }
        Err(e) => bail!("{}: no data available: {}", table, e),
    }
}

fn print_status(statuses: &[TableStatus]) {
    println!(
        "{:<20} {:>8} {:>12}  {}",
        "TABLE", "RECORDS", "AGE", "STATE"
    );
    for status in statuses {
        let records = status
            .records
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        let age = status.age.as_deref().unwrap_or("-");
        let state = match (&status.outcome, status.present) {
            (Some(outcome), _) => format!("{} ({})", outcome.classification, outcome.severity),
            (None, false) => "not cached".to_string(),
            (None, true) => "unknown".to_string(),
        };
        println!("{:<20} {:>8} {:>12}  {}", status.table, records, age, state);
    }
}
