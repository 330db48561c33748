//! The download-and-combine job.
//!
//! A job runs its stages in order: fetch the video information, select the streams, download
//! both of them concurrently, combine them, then finalize the temporary files and write the
//! subtitles. Cancellation is checked before each stage.

use crate::error::{Error, Result};
use crate::fetcher::Transport;
use crate::fetcher::stage::DownloadStage;
use crate::lifecycle::{self, AudioStatus, SubtitleStatus, TempArtifacts};
use crate::model::resolution::ResolutionLabel;
use crate::model::select_streams;
use crate::mux::{self, MergeRequest, Muxer};
use crate::progress::{self, NoopSink, ProgressSink};
use crate::provider::StreamProvider;
use crate::utils::file_system;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A flag shared with a running job, to stop it before its next stage.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns [`Error::Cancelled`] if the flag is set.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// The options of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Where the output, retained audio and subtitles are written. Temporary files too.
    pub output_dir: PathBuf,
    /// The container of the selected streams and of the output, e.g. `mp4`.
    pub container: String,
    /// Keeps the downloaded audio as `<title>.mp3`.
    pub keep_audio_separately: bool,
    /// The language of the subtitles to write, `None` to skip them.
    pub subtitle_language: Option<String>,
    /// Writes the title into the output's metadata.
    pub tag_metadata: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            container: "mp4".to_string(),
            keep_audio_separately: false,
            subtitle_language: Some("en".to_string()),
            tag_metadata: true,
        }
    }
}

/// The files produced by a successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub output_video_path: PathBuf,
    pub retained_audio_path: Option<PathBuf>,
    pub audio_status: AudioStatus,
    pub subtitle_path: Option<PathBuf>,
    pub subtitle_status: SubtitleStatus,
}

/// Downloads the separate video and audio streams of a video and combines them.
///
/// # Examples
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use yt_merge::fetcher::HttpTransport;
/// # use yt_merge::mux::{AnyMuxer, MuxStrategy};
/// # use yt_merge::pipeline::{Pipeline, PipelineOptions};
/// # use yt_merge::provider::YtDlpProvider;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let timeout = Duration::from_secs(3600);
/// let pipeline = Pipeline::new(
///     YtDlpProvider::new("yt-dlp", timeout),
///     HttpTransport::default(),
///     AnyMuxer::new(MuxStrategy::StreamCopy, "ffmpeg", timeout),
/// );
///
/// let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
/// let result = pipeline
///     .run(url, Some(&"720p".into()), &PipelineOptions::default())
///     .await?;
/// println!("Saved {}", result.output_video_path.display());
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<P, T, M> {
    provider: P,
    transport: T,
    muxer: M,
    sink: Arc<dyn ProgressSink>,
    cancellation: CancellationFlag,
}

impl<P, T, M> Pipeline<P, T, M>
where
    P: StreamProvider,
    T: Transport,
    M: Muxer,
{
    pub fn new(provider: P, transport: T, muxer: M) -> Self {
        Self {
            provider,
            transport,
            muxer,
            sink: Arc::new(NoopSink),
            cancellation: CancellationFlag::new(),
        }
    }

    /// Reports the progress of the jobs to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Stops the jobs before their next stage once `flag` is set.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn muxer(&self) -> &M {
        &self.muxer
    }

    /// Lists the resolutions that can be requested for a container, best first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataUnavailable`] if the video information could not be fetched.
    pub async fn resolutions(&self, url: &str, container: &str) -> Result<Vec<ResolutionLabel>> {
        let info = self
            .provider
            .fetch_video(url)
            .await
            .map_err(Error::into_metadata)?;

        Ok(info.available_resolutions(container))
    }

    /// Runs a job: downloads the streams of `resolution` (the best one if `None`) and
    /// combines them into `<title>.<container>`.
    ///
    /// # Errors
    ///
    /// The error's kind tells the failed stage. Temporary files are removed in every case.
    pub async fn run(
        &self,
        url: &str,
        resolution: Option<&ResolutionLabel>,
        options: &PipelineOptions,
    ) -> Result<PipelineResult> {
        self.cancellation.check()?;
        self.message("Fetching video information");

        let info = self
            .provider
            .fetch_video(url)
            .await
            .map_err(Error::into_metadata)?;
        let selected = select_streams(&info.streams, resolution, &options.container)?;
        let title = lifecycle::sanitize(&info.title);

        log::debug!("Selected streams of '{}': {} + {}", info.title, selected.video, selected.audio);

        self.cancellation.check()?;
        file_system::create_dir(&options.output_dir).map_err(Error::into_transfer)?;

        let artifacts = TempArtifacts::new(
            &options.output_dir,
            &selected.video.container_extension,
            &selected.audio.container_extension,
        );

        self.message(&format!(
            "Downloading {} video and audio",
            selected.video.resolution.as_deref().unwrap_or("best")
        ));
        let downloaded = DownloadStage::new(&self.transport, Arc::clone(&self.sink))
            .fetch(&selected, &artifacts)
            .await?;

        if let Err(e) = self.cancellation.check() {
            artifacts.cleanup().await;
            return Err(e);
        }

        let request = MergeRequest {
            video_path: downloaded.video,
            audio_path: downloaded.audio,
            output_title: title.clone(),
            keep_audio_separately: options.keep_audio_separately,
        };
        let output = request.output_path(&options.output_dir, &options.container);

        self.message("Combining video and audio");
        if let Err(e) = self.muxer.mux(&request, &output).await {
            let e = e.into_mux();
            if let Some(diagnostic) = e.diagnostic().filter(|d| !d.is_empty()) {
                log::error!("Multiplexer output:\n{}", diagnostic);
            }
            artifacts.cleanup().await;
            return Err(e);
        }

        if options.tag_metadata {
            if let Err(e) = mux::tag_output(&output, &info.title).await {
                log::warn!("Could not tag {}: {}", output.display(), e);
            }
        }

        let (retained_audio_path, audio_status) = artifacts
            .finalize(request.keep_audio_separately, &options.output_dir, &title)
            .await;
        log::info!("Saved {}", output.display());

        let (subtitle_path, subtitle_status) = match &options.subtitle_language {
            Some(language) => {
                self.message(&format!("Fetching '{}' subtitles", language));
                lifecycle::write_subtitles(&self.provider, url, language, &options.output_dir, &title)
                    .await
            }
            None => (None, SubtitleStatus::Skipped),
        };

        self.message(&format!("Saved {}", output.display()));
        Ok(PipelineResult {
            output_video_path: output,
            retained_audio_path,
            audio_status,
            subtitle_path,
            subtitle_status,
        })
    }

    fn message(&self, text: &str) {
        progress::report_message(self.sink.as_ref(), text);
    }
}
