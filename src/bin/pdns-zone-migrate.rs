use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use pdns_zone_migrate::batch::{exit_code, BatchDriver};
use pdns_zone_migrate::client::ApiClient;
use pdns_zone_migrate::config::{Cli, Config};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "unexpected failure setting up the migration");
            ExitCode::FAILURE
        }
    }
}

/// Everything fallible that isn't already a typed [`pdns_zone_migrate::Error`]
/// (signal-handler install failures, anything else that "should never
/// happen" on a sane host) is reported through `anyhow` and mapped to a
/// generic failure exit; configuration and connection errors are handled
/// explicitly below so they get the dedicated exit code 64.
async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(ExitCode::from(64));
        }
    };

    let cancel = install_signal_handler().context("installing SIGINT/SIGTERM handlers")?;

    let source = match ApiClient::new(&config.source) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(ExitCode::from(64));
        }
    };
    let target = match ApiClient::new(&config.target) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(ExitCode::from(64));
        }
    };

    info!(zones = config.zones.len(), "starting batch migration");

    let driver = BatchDriver::new(source, target, config.migrator, config.batch);
    let summary = driver
        .run(config.zones, cancel, |snapshot| {
            info!(
                total = snapshot.total,
                completed = snapshot.completed,
                succeeded = snapshot.succeeded,
                failed = snapshot.failed,
                in_flight = snapshot.in_flight,
                elapsed_secs = snapshot.elapsed.as_secs_f64(),
                "progress"
            );
        })
        .await;

    for result in &summary.results {
        match &result.outcome {
            Ok(migration) => info!(
                zone = %result.zone,
                action = %migration.action,
                elapsed_ms = result.elapsed.as_millis() as u64,
                changes = migration.changes.len(),
                "zone migrated"
            ),
            Err(err) => warn!(
                zone = %result.zone,
                elapsed_ms = result.elapsed.as_millis() as u64,
                error = %err,
                "zone migration failed"
            ),
        }
    }

    info!(
        succeeded = summary.succeeded_count(),
        failed = summary.failed_count(),
        total = summary.results.len(),
        "batch migration finished"
    );
    if let pdns_zone_migrate::BatchOutcomeKind::StoppedOnError(zone, msg) = &summary.outcome {
        error!(zone = %zone, error = %msg, "stopped on first error");
    }

    Ok(ExitCode::from(exit_code(&summary) as u8))
}

fn init_logging(log_level: &str, verbose: u8) {
    let default_directive = match verbose {
        0 => log_level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// First SIGINT/SIGTERM requests graceful cancellation; a second forces
/// immediate process abandonment, per spec.md §6.
fn install_signal_handler() -> anyhow::Result<CancellationToken> {
    let cancel = CancellationToken::new();
    let watcher = signal_watcher()?;

    let cancel_for_task = cancel.clone();
    tokio::spawn(async move {
        watcher.wait_once().await;
        warn!("interrupt received, cancelling in-flight zones (press again to force-quit)");
        cancel_for_task.cancel();
        watcher.wait_once().await;
        warn!("second interrupt received, abandoning immediately");
        std::process::exit(130);
    });

    Ok(cancel)
}

#[cfg(unix)]
fn signal_watcher() -> anyhow::Result<SignalWatcher> {
    use tokio::signal::unix::{signal, SignalKind};
    Ok(SignalWatcher {
        sigint: signal(SignalKind::interrupt()).context("registering SIGINT handler")?,
        sigterm: signal(SignalKind::terminate()).context("registering SIGTERM handler")?,
    })
}

#[cfg(unix)]
struct SignalWatcher {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalWatcher {
    async fn wait_once(&mut self) {
        tokio::select! {
            _ = self.sigint.recv() => {}
            _ = self.sigterm.recv() => {}
        }
    }
}

#[cfg(not(unix))]
fn signal_watcher() -> anyhow::Result<SignalWatcher> {
    Ok(SignalWatcher)
}

#[cfg(not(unix))]
struct SignalWatcher;

#[cfg(not(unix))]
impl SignalWatcher {
    async fn wait_once(&mut self) {
        let _ = tokio::signal::ctrl_c().await;
    }
}
