//! Progress reporting towards whatever presentation layer is attached to a job.

use std::sync::Arc;
use thiserror::Error;

/// A failure of a progress sink, e.g. a display that was closed.
/// Sink failures are logged by the reporter and never abort a transfer.
#[derive(Debug, Error)]
#[error("Progress sink unavailable: {0}")]
pub struct SinkError(pub String);

/// The result of a sink update.
pub type SinkResult = std::result::Result<(), SinkError>;

/// Receives progress updates of a job. Updates may arrive from any task or thread.
pub trait ProgressSink: Send + Sync {
    /// Called with a completion percentage in `0.0..=100.0`.
    fn on_percentage(&self, value: f64) -> SinkResult;

    /// Called with a human-readable status message.
    fn on_message(&self, text: &str) -> SinkResult;

    /// Returns a dedicated sink for one transfer of the job (e.g. `"video"` or `"audio"`).
    ///
    /// Sinks without per-transfer display return `None`, and the transfer reports to this sink.
    fn transfer_sink(&self, _label: &str) -> Option<Arc<dyn ProgressSink>> {
        None
    }
}

/// Returns the sink a transfer labelled `label` should report to.
pub fn sink_for_transfer(sink: &Arc<dyn ProgressSink>, label: &str) -> Arc<dyn ProgressSink> {
    sink.transfer_sink(label).unwrap_or_else(|| Arc::clone(sink))
}

/// Sends a status message, logging instead of failing when the sink is gone.
pub fn report_message(sink: &dyn ProgressSink, text: &str) {
    if let Err(e) = sink.on_message(text) {
        log::warn!("Dropping progress message '{}': {}", text, e);
    }
}

/// A sink that discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_percentage(&self, _value: f64) -> SinkResult {
        Ok(())
    }

    fn on_message(&self, _text: &str) -> SinkResult {
        Ok(())
    }
}

/// A sink that writes updates to the log.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    label: Option<String>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for LogSink {
    fn on_percentage(&self, value: f64) -> SinkResult {
        match &self.label {
            Some(label) => log::debug!("{}: {:.1}%", label, value),
            None => log::debug!("{:.1}%", value),
        }
        Ok(())
    }

    fn on_message(&self, text: &str) -> SinkResult {
        log::info!("{}", text);
        Ok(())
    }

    fn transfer_sink(&self, label: &str) -> Option<Arc<dyn ProgressSink>> {
        Some(Arc::new(LogSink {
            label: Some(label.to_string()),
        }))
    }
}
