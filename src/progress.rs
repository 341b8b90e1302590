use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A point-in-time view of a batch run, as emitted by the progress ticker
/// and as the final summary regardless of whether the ticker ever fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_flight: u64,
    pub elapsed: Duration,
}

/// Shared, lock-free counters the batch driver updates as zones start and
/// finish; cheap to clone (`Arc` internally) so every spawned zone task can
/// hold one without borrowing the driver.
#[derive(Clone)]
pub struct Progress {
    inner: Arc<Counters>,
}

struct Counters {
    total: u64,
    completed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
    start: Instant,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Progress {
            inner: Arc::new(Counters {
                total,
                completed: AtomicU64::new(0),
                succeeded: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                in_flight: AtomicU64::new(0),
                start: Instant::now(),
            }),
        }
    }

    pub fn zone_started(&self) {
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn zone_finished(&self, succeeded: bool) {
        self.inner.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.inner.completed.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.inner.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.inner.total,
            completed: self.inner.completed.load(Ordering::Relaxed),
            succeeded: self.inner.succeeded.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            elapsed: self.inner.start.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_started_and_finished_zones() {
        let progress = Progress::new(3);
        progress.zone_started();
        progress.zone_started();
        progress.zone_finished(true);
        progress.zone_finished(false);

        let snap = progress.snapshot();
        assert_eq!(snap.total, 3);
        assert_eq!(snap.in_flight, 0);
        assert_eq!(snap.completed, 2);
        assert_eq!(snap.succeeded, 1);
        assert_eq!(snap.failed, 1);
    }
}
