//! Run-wide count of delivered messages.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// Snapshot handed to a [`ProgressSink`] after each successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub sent: usize,
    pub total: usize,
}

impl ProgressUpdate {
    /// Fraction complete in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.sent as f64 / self.total as f64
    }
}

/// Receives progress updates, e.g. to drive a progress bar.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Atomic counter of sent messages out of the run's total recipients.
///
/// The count never decreases and never exceeds `total`.
pub struct ProgressAggregator {
    sent: AtomicUsize,
    total: usize,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl ProgressAggregator {
    pub fn new(total: usize) -> Self {
        Self {
            sent: AtomicUsize::new(0),
            total,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Count one successful send and notify the sink. Saturates at `total`.
    pub fn record_sent(&self) -> ProgressUpdate {
        let previous = self
            .sent
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.total).then_some(n + 1)
            });
        let sent = match previous {
            Ok(n) => n + 1,
            Err(n) => n,
        };

        let update = ProgressUpdate {
            sent,
            total: self.total,
        };
        trace!(sent, total = self.total, "Progress updated");
        if let Some(sink) = &self.sink {
            sink.report(update);
        }
        update
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn snapshot(&self) -> ProgressUpdate {
        ProgressUpdate {
            sent: self.sent(),
            total: self.total,
        }
    }
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("sent", &self.sent())
            .field("total", &self.total)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_record_sent_increments() {
        let progress = ProgressAggregator::new(4);
        assert_eq!(progress.record_sent(), ProgressUpdate { sent: 1, total: 4 });
        assert_eq!(progress.record_sent().sent, 2);
        assert!((progress.snapshot().fraction() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_sent_saturates_at_total() {
        let progress = ProgressAggregator::new(1);
        progress.record_sent();
        assert_eq!(progress.record_sent().sent, 1);
        assert_eq!(progress.sent(), 1);
    }

    #[test]
    fn test_sink_receives_every_update() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let progress = ProgressAggregator::new(3).with_sink(Arc::new(move |u: ProgressUpdate| {
            sink_seen.lock().unwrap().push(u.sent);
        }));

        progress.record_sent();
        progress.record_sent();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_concurrent_increments_are_counted() {
        let progress = Arc::new(ProgressAggregator::new(1000));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let progress = Arc::clone(&progress);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        progress.record_sent();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(progress.sent(), 400);
    }

    #[test]
    fn test_fraction_of_empty_run_is_zero() {
        assert_eq!(ProgressAggregator::new(0).snapshot().fraction(), 0.0);
    }
}
