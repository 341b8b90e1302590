use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::client::ApiClient;
use crate::error::MigrateError;
use crate::migrate::{Migrator, MigratorOptions};
use crate::progress::{Progress, ProgressSnapshot};
use crate::types::{MigrationResult, ZoneName};

/// Policy applied when a zone migration fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    /// Record the failure and keep scheduling the remaining zones.
    Continue,
    /// Stop accepting new work, cancel in-flight zones, and unwind.
    Stop,
}

/// Knobs for one [`BatchDriver`] run.
#[derive(Debug, Clone, Copy)]
pub struct BatchDriverOptions {
    pub concurrency: usize,
    pub on_error: OnError,
    /// `Duration::ZERO` means wait indefinitely for in-flight zones to
    /// unwind once cancellation has been requested.
    pub graceful_timeout: Duration,
    /// `Duration::ZERO` disables the periodic progress ticker; the final
    /// snapshot is always emitted regardless.
    pub progress_interval: Duration,
}

/// One zone's final outcome. Always present, one per input zone, even if
/// the zone was never dispatched — in which case `outcome` is
/// `Err(MigrateError::Cancelled)`.
#[derive(Debug, Clone)]
pub struct ZoneOutcome {
    pub zone: ZoneName,
    pub outcome: Result<MigrationResult, MigrateError>,
    pub elapsed: Duration,
}

/// Why a batch run ended the way it did.
#[derive(Debug, Clone)]
pub enum BatchOutcomeKind {
    /// Every zone was dispatched and the run was not interrupted.
    Completed,
    /// `on_error = Stop` fired on the named zone's error; the driver
    /// stopped dispatching new work and unwound in-flight zones.
    StoppedOnError(ZoneName, String),
    /// An external signal requested cancellation before all zones
    /// finished.
    CancelledByInterrupt,
}

/// Aggregated result of running every zone through a [`Migrator`].
/// `results` always has one entry per input zone, in input order,
/// regardless of the order in which zones actually finished.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub results: Vec<ZoneOutcome>,
    pub final_snapshot: ProgressSnapshot,
    pub outcome: BatchOutcomeKind,
}

impl BatchSummary {
    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_err()).count()
    }
}

/// Reads a list of zone names, migrates each one through its own
/// [`Migrator`] pipeline, and runs up to `concurrency` of them at once. A
/// bounded [`tokio::sync::Semaphore`] is the hard ceiling on concurrent
/// in-flight zones; a shared [`CancellationToken`] carries both external
/// interrupts and the driver's own `on_error = Stop` signal down into every
/// HTTP attempt.
pub struct BatchDriver {
    source: ApiClient,
    target: ApiClient,
    migrator_opts: MigratorOptions,
    options: BatchDriverOptions,
}

impl BatchDriver {
    pub fn new(
        source: ApiClient,
        target: ApiClient,
        migrator_opts: MigratorOptions,
        options: BatchDriverOptions,
    ) -> Self {
        BatchDriver {
            source,
            target,
            migrator_opts,
            options,
        }
    }

    /// Runs every zone to completion (or cancellation) and returns the
    /// aggregated, input-ordered summary. `cancel` is the external
    /// cancellation signal (tied to SIGINT/SIGTERM by the CLI binary);
    /// `on_progress` is invoked with a snapshot on every ticker interval and
    /// exactly once more at the end regardless of the interval.
    pub async fn run(
        &self,
        zones: Vec<ZoneName>,
        cancel: CancellationToken,
        on_progress: impl Fn(ProgressSnapshot) + Send + Sync + 'static,
    ) -> BatchSummary {
        let total = zones.len();
        let zone_names = zones.clone();
        let progress = Progress::new(total as u64);
        let on_progress = Arc::new(on_progress);
        let sem = Arc::new(tokio::sync::Semaphore::new(self.options.concurrency.max(1)));
        // Cancelled either by the caller's external signal or, under
        // `on_error = Stop`, by the first zone failure; every HTTP attempt
        // observes this same token.
        let stop_token = cancel.child_token();
        let ticker_done = CancellationToken::new();

        let ticker = self.spawn_ticker(progress.clone(), ticker_done.clone(), on_progress.clone());

        let mut pending: JoinSet<(usize, ZoneName, Result<MigrationResult, MigrateError>, Duration)> =
            JoinSet::new();

        for (idx, zone) in zones.into_iter().enumerate() {
            let source = self.source.clone();
            let target = self.target.clone();
            let opts = self.migrator_opts;
            let sem = sem.clone();
            let stop_token = stop_token.clone();
            let progress = progress.clone();
            pending.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = stop_token.cancelled() => None,
                    permit = sem.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return (idx, zone, Err(MigrateError::Cancelled), Duration::ZERO);
                };
                progress.zone_started();
                let started = Instant::now();
                let migrator = Migrator::new(source, target, opts);
                let result = migrator.run(&zone, &stop_token).await;
                let elapsed = started.elapsed();
                progress.zone_finished(result.is_ok());
                (idx, zone, result, elapsed)
            });
        }

        let mut results: Vec<Option<ZoneOutcome>> = (0..total).map(|_| None).collect();
        let mut stop_cause: Option<(ZoneName, String)> = None;
        let mut grace_deadline: Option<Instant> = None;
        let mut grace_armed = false;

        loop {
            let joined = match grace_deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, pending.join_next()).await {
                    Ok(v) => v,
                    Err(_) => {
                        warn!("graceful timeout expired; abandoning in-flight zones");
                        pending.abort_all();
                        break;
                    }
                },
                None => pending.join_next().await,
            };

            let Some(joined) = joined else { break };
            let Ok((idx, zone, result, elapsed)) = joined else {
                // The task itself panicked; treat as an abandoned slot and
                // keep draining the rest.
                continue;
            };

            if self.options.on_error == OnError::Stop && stop_cause.is_none() {
                if let Err(err) = &result {
                    if !matches!(err, MigrateError::Cancelled) {
                        warn!(zone = %zone, error = %err, "stopping batch on first error");
                        stop_cause = Some((zone.clone(), err.to_string()));
                        stop_token.cancel();
                    }
                }
            }
            results[idx] = Some(ZoneOutcome { zone, outcome: result, elapsed });

            if stop_token.is_cancelled() && !grace_armed {
                grace_armed = true;
                if !self.options.graceful_timeout.is_zero() {
                    grace_deadline = Some(Instant::now() + self.options.graceful_timeout);
                }
            }
        }

        // Anything still `None` was aborted after the grace period expired
        // while still in flight.
        let results: Vec<ZoneOutcome> = results
            .into_iter()
            .zip(zone_names)
            .map(|(slot, zone)| {
                slot.unwrap_or(ZoneOutcome {
                    zone,
                    outcome: Err(MigrateError::Cancelled),
                    elapsed: Duration::ZERO,
                })
            })
            .collect();

        ticker_done.cancel();
        if let Some(handle) = ticker {
            let _ = handle.await;
        }
        let final_snapshot = progress.snapshot();
        on_progress(final_snapshot);

        let outcome = if let Some((zone, msg)) = stop_cause {
            BatchOutcomeKind::StoppedOnError(zone, msg)
        } else if cancel.is_cancelled() {
            BatchOutcomeKind::CancelledByInterrupt
        } else {
            BatchOutcomeKind::Completed
        };

        BatchSummary {
            results,
            final_snapshot,
            outcome,
        }
    }

    fn spawn_ticker(
        &self,
        progress: Progress,
        finished: CancellationToken,
        on_progress: Arc<dyn Fn(ProgressSnapshot) + Send + Sync>,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if self.options.progress_interval.is_zero() {
            return None;
        }
        let interval_dur = self.options.progress_interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_dur);
            ticker.tick().await; // first tick fires immediately; the caller gets the final snapshot separately
            loop {
                tokio::select! {
                    _ = finished.cancelled() => break,
                    _ = ticker.tick() => {
                        on_progress(progress.snapshot());
                    }
                }
            }
        }))
    }
}

/// Maps a finished batch run to the process exit code table in spec.md §6:
/// `0` all zones succeeded (or NOOP), `1` one or more failures under
/// `continue`, `2` stopped by policy under `stop`, `3` cancelled by
/// interrupt with at least one zone abandoned before it finished.
pub fn exit_code(summary: &BatchSummary) -> i32 {
    match &summary.outcome {
        BatchOutcomeKind::StoppedOnError(_, _) => 2,
        BatchOutcomeKind::CancelledByInterrupt
            if summary
                .results
                .iter()
                .any(|r| matches!(r.outcome, Err(MigrateError::Cancelled))) =>
        {
            3
        }
        _ if summary.failed_count() > 0 => 1,
        _ => 0,
    }
}

/// Reads zone names from newline-delimited text: blank lines and lines
/// beginning with `#` are ignored, and names are de-duplicated (by the
/// case-insensitive [`ZoneName`] comparison) while preserving first-seen
/// order.
pub fn dedupe_zone_names(names: impl IntoIterator<Item = ZoneName>) -> Vec<ZoneName> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for name in names {
        if seen.insert(name.clone()) {
            out.push(name);
        }
    }
    out
}
