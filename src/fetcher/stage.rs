//! The download stage of a job: both selected streams, transferred concurrently.

use crate::error::{Error, Result};
use crate::fetcher::tracker::TransferTracker;
use crate::fetcher::{ProgressCallback, Transport};
use crate::lifecycle::TempArtifacts;
use crate::model::{SelectedStreams, StreamDescriptor};
use crate::progress::{self, ProgressSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// One in-flight transfer.
#[derive(Debug)]
pub struct DownloadJob<'a> {
    pub stream: &'a StreamDescriptor,
    pub destination: PathBuf,
    remaining: Arc<AtomicU64>,
    tracker: Arc<TransferTracker>,
}

impl<'a> DownloadJob<'a> {
    pub fn new(
        stream: &'a StreamDescriptor,
        destination: impl Into<PathBuf>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let total = stream.total_size_bytes.unwrap_or(0);

        Self {
            stream,
            destination: destination.into(),
            remaining: Arc::new(AtomicU64::new(total)),
            tracker: Arc::new(TransferTracker::new(total, sink)),
        }
    }

    pub fn bytes_total(&self) -> u64 {
        self.tracker.total()
    }

    pub fn bytes_remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn percentage(&self) -> f64 {
        self.tracker.percentage()
    }

    /// The callback handed to the transport, feeding this job's tracker.
    pub fn progress_callback(&self) -> ProgressCallback {
        let remaining = Arc::clone(&self.remaining);
        let tracker = Arc::clone(&self.tracker);

        Arc::new(move |bytes_remaining, bytes_total| {
            if bytes_total > 0 {
                tracker.learn_total(bytes_total);
            }
            remaining.store(bytes_remaining, Ordering::Release);
            tracker.update(bytes_remaining);
        })
    }

    async fn run<T: Transport>(&self, transport: &T) -> Result<PathBuf> {
        let written = transport
            .download(self.stream, &self.destination, self.progress_callback())
            .await
            .map_err(Error::into_transfer)?;

        self.remaining.store(0, Ordering::Release);
        self.tracker.complete();
        Ok(written)
    }
}

/// The temporary files written by the download stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedPair {
    pub video: PathBuf,
    pub audio: PathBuf,
}

/// Downloads the selected streams of a job into its temporary files.
pub struct DownloadStage<'a, T: Transport> {
    transport: &'a T,
    sink: Arc<dyn ProgressSink>,
}

impl<'a, T: Transport> DownloadStage<'a, T> {
    pub fn new(transport: &'a T, sink: Arc<dyn ProgressSink>) -> Self {
        Self { transport, sink }
    }

    /// Transfers the video and audio streams at the same time, and waits for both.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferFailed`] if either transfer fails. The job's temporary files
    /// are removed before the error is returned.
    pub async fn fetch(
        &self,
        selected: &SelectedStreams<'_>,
        artifacts: &TempArtifacts,
    ) -> Result<DownloadedPair> {
        let video = self.job(selected.video, artifacts.video_path(), "video");
        let audio = self.job(selected.audio, artifacts.audio_path(), "audio");

        log::debug!(
            "Downloading {} and {} for job {}",
            video.stream,
            audio.stream,
            artifacts.job()
        );

        let (video_result, audio_result) =
            tokio::join!(video.run(self.transport), audio.run(self.transport));

        let downloaded = match (video_result, audio_result) {
            (Ok(video), Ok(audio)) => {
                artifacts.track(&video);
                artifacts.track(&audio);
                DownloadedPair { video, audio }
            }
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("Download of job {} failed: {}", artifacts.job(), e);
                artifacts.cleanup().await;
                return Err(e);
            }
        };

        progress::report_message(self.sink.as_ref(), "Download complete");
        Ok(downloaded)
    }

    fn job<'s>(&self, stream: &'s StreamDescriptor, path: &Path, label: &str) -> DownloadJob<'s> {
        DownloadJob::new(stream, path, progress::sink_for_transfer(&self.sink, label))
    }
}
