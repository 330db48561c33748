//! Turns "bytes remaining" updates of a transfer into a monotonic completion percentage.

use crate::progress::ProgressSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Tracks the completion of one transfer and forwards it to a progress sink.
///
/// The reported percentage never decreases: if the transport reports more remaining bytes
/// than before, the previous percentage is reported again. Sink failures are logged and
/// swallowed, they never interrupt the transfer.
///
/// # Examples
///
/// ```rust
/// # use std::sync::Arc;
/// # use yt_merge::fetcher::tracker::TransferTracker;
/// # use yt_merge::progress::NoopSink;
/// let tracker = TransferTracker::new(1000, Arc::new(NoopSink));
///
/// assert_eq!(tracker.update(600), 40.0);
/// assert_eq!(tracker.update(800), 40.0);
/// assert_eq!(tracker.update(0), 100.0);
/// ```
pub struct TransferTracker {
    total: AtomicU64,
    /// The last reported percentage, which is the floor of the next one.
    shown: Mutex<f64>,
    sink: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for TransferTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferTracker")
            .field("total", &self.total.load(Ordering::Relaxed))
            .field("percentage", &self.percentage())
            .finish_non_exhaustive()
    }
}

impl TransferTracker {
    /// Creates a tracker for a transfer of `total` bytes. A total of `0` means unknown.
    pub fn new(total: u64, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            total: AtomicU64::new(total),
            shown: Mutex::new(0.0),
            sink,
        }
    }

    /// Sets the total size once the transport learns it, if it was unknown.
    pub fn learn_total(&self, total: u64) {
        let _ = self
            .total
            .compare_exchange(0, total, Ordering::AcqRel, Ordering::Acquire);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Records the number of bytes still to transfer, and reports the resulting percentage.
    pub fn update(&self, bytes_remaining: u64) -> f64 {
        let total = self.total();
        let raw = if total == 0 {
            0.0
        } else {
            let done = total.saturating_sub(bytes_remaining);
            (done as f64 * 100.0 / total as f64).clamp(0.0, 100.0)
        };

        self.report(raw)
    }

    /// Reports the transfer as complete.
    pub fn complete(&self) -> f64 {
        self.report(100.0)
    }

    /// The last reported percentage.
    pub fn percentage(&self) -> f64 {
        *self.shown.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn report(&self, raw: f64) -> f64 {
        // The lock is held while notifying so concurrent updates reach the sink in order.
        let mut shown = self
            .shown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if raw > *shown {
            *shown = raw;
        }

        if let Err(e) = self.sink.on_percentage(*shown) {
            log::warn!("Ignoring progress sink failure: {}", e);
        }

        *shown
    }
}
