use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use yt_merge::error::{Error, ErrorKind, Result};
use yt_merge::fetcher::{ProgressCallback, Transport};
use yt_merge::lifecycle::{AudioStatus, SubtitleStatus};
use yt_merge::model::{CaptionCue, CaptionTrack, StreamDescriptor, StreamKind, VideoInfo};
use yt_merge::mux::{MergeRequest, Muxer};
use yt_merge::pipeline::{CancellationFlag, Pipeline, PipelineOptions};
use yt_merge::progress::{ProgressSink, SinkResult};
use yt_merge::provider::StreamProvider;

const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

fn stream(id: &str, kind: StreamKind, resolution: Option<&str>, ext: &str) -> StreamDescriptor {
    StreamDescriptor {
        format_id: id.to_string(),
        url: format!("https://media.example/{}", id),
        resolution: resolution.map(str::to_string),
        kind,
        container_extension: ext.to_string(),
        total_size_bytes: Some(1000),
        http_headers: Default::default(),
    }
}

fn video_info() -> VideoInfo {
    VideoInfo {
        id: "dQw4w9WgXcQ".to_string(),
        title: "My/Video:Title?".to_string(),
        streams: vec![
            stream("137", StreamKind::VideoOnly, Some("1080p"), "mp4"),
            stream("136", StreamKind::VideoOnly, Some("720p"), "mp4"),
            stream("140", StreamKind::AudioOnly, None, "m4a"),
        ],
    }
}

struct MockProvider {
    info: VideoInfo,
    captions: Option<CaptionTrack>,
    unavailable: bool,
}

impl MockProvider {
    fn new(info: VideoInfo) -> Self {
        Self {
            info,
            captions: None,
            unavailable: false,
        }
    }
}

impl StreamProvider for MockProvider {
    async fn fetch_video(&self, _url: &str) -> Result<VideoInfo> {
        if self.unavailable {
            return Err(Error::Command {
                code: 1,
                stderr: "ERROR: Video unavailable".to_string(),
            });
        }
        Ok(self.info.clone())
    }

    async fn fetch_captions(&self, _url: &str, language: &str) -> Result<Option<CaptionTrack>> {
        Ok(self
            .captions
            .clone()
            .filter(|track| track.language_code == language))
    }
}

#[derive(Default)]
struct MockTransport {
    destinations: Mutex<Vec<PathBuf>>,
    fail_audio: bool,
    cancel_on_download: Option<CancellationFlag>,
}

impl MockTransport {
    fn downloads(&self) -> Vec<PathBuf> {
        self.destinations.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    async fn download(
        &self,
        stream: &StreamDescriptor,
        destination: &Path,
        on_progress: ProgressCallback,
    ) -> Result<PathBuf> {
        self.destinations
            .lock()
            .unwrap()
            .push(destination.to_path_buf());

        tokio::fs::write(destination, stream.format_id.as_bytes()).await?;
        on_progress(1000, 1000);
        on_progress(400, 1000);

        if self.fail_audio && stream.is_audio_only() {
            return Err(Error::IO(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        if let Some(flag) = &self.cancel_on_download {
            flag.cancel();
        }

        on_progress(0, 1000);
        Ok(destination.to_path_buf())
    }
}

#[derive(Default)]
struct MockMuxer {
    exit_code: Option<i32>,
    consume_audio: bool,
    requests: Mutex<Vec<MergeRequest>>,
}

impl Muxer for MockMuxer {
    async fn mux(&self, request: &MergeRequest, output: &Path) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());

        let mut combined = tokio::fs::read(&request.video_path).await?;
        combined.extend(tokio::fs::read(&request.audio_path).await?);
        tokio::fs::write(output, combined).await?;
        if self.consume_audio {
            tokio::fs::remove_file(&request.audio_path).await?;
        }

        match self.exit_code {
            Some(code) => {
                tokio::fs::remove_file(output).await?;
                Err(Error::Command {
                    code,
                    stderr: "Could not find tag for codec".to_string(),
                }
                .into_mux())
            }
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    label: Option<String>,
    percentages: Arc<Mutex<Vec<(String, f64)>>>,
    messages: Arc<Mutex<Vec<String>>>,
}

impl ProgressSink for RecordingSink {
    fn on_percentage(&self, value: f64) -> SinkResult {
        let label = self.label.clone().unwrap_or_default();
        self.percentages.lock().unwrap().push((label, value));
        Ok(())
    }

    fn on_message(&self, text: &str) -> SinkResult {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn transfer_sink(&self, label: &str) -> Option<Arc<dyn ProgressSink>> {
        Some(Arc::new(RecordingSink {
            label: Some(label.to_string()),
            percentages: Arc::clone(&self.percentages),
            messages: Arc::clone(&self.messages),
        }))
    }
}

fn options(dir: &Path) -> PipelineOptions {
    PipelineOptions {
        output_dir: dir.to_path_buf(),
        container: "mp4".to_string(),
        keep_audio_separately: false,
        subtitle_language: None,
        tag_metadata: false,
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn downloads_requested_resolution_and_leaves_only_the_output() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let pipeline = Pipeline::new(
        MockProvider::new(video_info()),
        MockTransport::default(),
        MockMuxer::default(),
    )
    .with_sink(sink.clone());

    let result = pipeline
        .run(URL, Some(&"720p".into()), &options(dir.path()))
        .await
        .unwrap();

    assert_eq!(result.output_video_path, dir.path().join("My_Video_Title_.mp4"));
    assert_eq!(result.retained_audio_path, None);
    assert_eq!(result.subtitle_status, SubtitleStatus::Skipped);
    assert_eq!(file_names(dir.path()), ["My_Video_Title_.mp4"]);
    assert_eq!(std::fs::read(&result.output_video_path).unwrap(), b"136140");

    let percentages = sink.percentages.lock().unwrap();
    for label in ["video", "audio"] {
        let values: Vec<f64> = percentages
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, value)| *value)
            .collect();
        assert_eq!(values.first(), Some(&0.0));
        assert_eq!(values.last(), Some(&100.0));
        assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    let messages = sink.messages.lock().unwrap();
    assert!(messages.iter().any(|text| text == "Combining video and audio"));
}

#[tokio::test]
async fn best_resolution_is_used_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        MockProvider::new(video_info()),
        MockTransport::default(),
        MockMuxer::default(),
    );

    let result = pipeline.run(URL, None, &options(dir.path())).await.unwrap();

    assert_eq!(std::fs::read(&result.output_video_path).unwrap(), b"137140");
}

#[tokio::test]
async fn keeps_audio_and_writes_subtitles() {
    let dir = tempfile::tempdir().unwrap();
    let mut provider = MockProvider::new(video_info());
    provider.captions = Some(CaptionTrack {
        language_code: "en".to_string(),
        cues: vec![CaptionCue {
            start_ms: 1500,
            end_ms: 4000,
            text: "Never gonna give you up".to_string(),
        }],
    });
    let pipeline = Pipeline::new(provider, MockTransport::default(), MockMuxer::default());
    let options = PipelineOptions {
        keep_audio_separately: true,
        subtitle_language: Some("en".to_string()),
        ..options(dir.path())
    };

    let result = pipeline.run(URL, Some(&"720p".into()), &options).await.unwrap();

    assert_eq!(
        file_names(dir.path()),
        ["My_Video_Title_.mp3", "My_Video_Title_.mp4", "My_Video_Title_.srt"]
    );
    assert_eq!(result.retained_audio_path, Some(dir.path().join("My_Video_Title_.mp3")));
    assert_eq!(result.audio_status, AudioStatus::Kept);
    assert_eq!(std::fs::read(dir.path().join("My_Video_Title_.mp3")).unwrap(), b"140");
    assert_eq!(result.subtitle_status, SubtitleStatus::Saved);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("My_Video_Title_.srt")).unwrap(),
        "1\n00:00:01,500 --> 00:00:04,000\nNever gonna give you up\n\n"
    );
}

#[tokio::test]
async fn missing_subtitles_do_not_fail_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        MockProvider::new(video_info()),
        MockTransport::default(),
        MockMuxer::default(),
    );
    let options = PipelineOptions {
        subtitle_language: Some("de".to_string()),
        ..options(dir.path())
    };

    let result = pipeline.run(URL, None, &options).await.unwrap();

    assert_eq!(result.subtitle_status, SubtitleStatus::NotAvailable);
    assert_eq!(result.subtitle_path, None);
    assert_eq!(file_names(dir.path()), ["My_Video_Title_.mp4"]);
}

#[tokio::test]
async fn mux_failure_reports_diagnostic_and_removes_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        MockProvider::new(video_info()),
        MockTransport::default(),
        MockMuxer {
            exit_code: Some(1),
            ..Default::default()
        },
    );

    let error = pipeline
        .run(URL, Some(&"720p".into()), &options(dir.path()))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::MuxFailed);
    assert_eq!(error.diagnostic(), Some("Could not find tag for codec"));
    assert!(file_names(dir.path()).is_empty());
}

#[tokio::test]
async fn missing_audio_stream_downloads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut info = video_info();
    info.streams.retain(|stream| !stream.is_audio_only());
    let pipeline = Pipeline::new(
        MockProvider::new(info),
        MockTransport::default(),
        MockMuxer::default(),
    );

    let error = pipeline
        .run(URL, Some(&"720p".into()), &options(dir.path()))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::StreamsUnavailable);
    assert!(error.to_string().contains("audio"));
    assert!(pipeline_downloads(&pipeline).is_empty());
    assert!(file_names(dir.path()).is_empty());
}

#[tokio::test]
async fn unavailable_video_is_a_metadata_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut provider = MockProvider::new(video_info());
    provider.unavailable = true;
    let pipeline = Pipeline::new(provider, MockTransport::default(), MockMuxer::default());

    let error = pipeline.run(URL, None, &options(dir.path())).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::MetadataUnavailable);
    assert!(error.to_string().contains("Video unavailable"));
}

#[tokio::test]
async fn transfer_failure_removes_partial_files() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        MockProvider::new(video_info()),
        MockTransport {
            fail_audio: true,
            ..Default::default()
        },
        MockMuxer::default(),
    );

    let error = pipeline
        .run(URL, Some(&"720p".into()), &options(dir.path()))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::TransferFailed);
    assert!(error.to_string().contains("connection reset"));
    assert!(pipeline.muxer().requests.lock().unwrap().is_empty());
    assert!(file_names(dir.path()).is_empty());
}

#[tokio::test]
async fn jobs_use_distinct_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        MockProvider::new(video_info()),
        MockTransport::default(),
        MockMuxer::default(),
    );

    pipeline.run(URL, Some(&"720p".into()), &options(dir.path())).await.unwrap();
    pipeline.run(URL, Some(&"720p".into()), &options(dir.path())).await.unwrap();

    let mut downloads = pipeline_downloads(&pipeline);
    assert_eq!(downloads.len(), 4);
    downloads.sort();
    downloads.dedup();
    assert_eq!(downloads.len(), 4);

    for path in &downloads {
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("video_temp_") || name.starts_with("audio_temp_"));
    }
}

#[tokio::test]
async fn cancelled_job_does_not_start() {
    let dir = tempfile::tempdir().unwrap();
    let flag = CancellationFlag::new();
    let pipeline = Pipeline::new(
        MockProvider::new(video_info()),
        MockTransport::default(),
        MockMuxer::default(),
    )
    .with_cancellation(flag.clone());

    flag.cancel();
    let error = pipeline.run(URL, None, &options(dir.path())).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Cancelled);
    assert!(pipeline_downloads(&pipeline).is_empty());
}

#[tokio::test]
async fn cancellation_during_download_stops_before_mux_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let flag = CancellationFlag::new();
    let pipeline = Pipeline::new(
        MockProvider::new(video_info()),
        MockTransport {
            cancel_on_download: Some(flag.clone()),
            ..Default::default()
        },
        MockMuxer::default(),
    )
    .with_cancellation(flag);

    let error = pipeline.run(URL, None, &options(dir.path())).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Cancelled);
    assert!(pipeline.muxer().requests.lock().unwrap().is_empty());
    assert!(file_names(dir.path()).is_empty());
}

#[tokio::test]
async fn lists_resolutions_best_first() {
    let pipeline = Pipeline::new(
        MockProvider::new(video_info()),
        MockTransport::default(),
        MockMuxer::default(),
    );

    let resolutions = pipeline.resolutions(URL, "mp4").await.unwrap();
    let labels: Vec<&str> = resolutions.iter().map(|label| label.as_str()).collect();

    assert_eq!(labels, ["1080p", "720p"]);
}

fn pipeline_downloads(pipeline: &Pipeline<MockProvider, MockTransport, MockMuxer>) -> Vec<PathBuf> {
    pipeline.transport().downloads()
}

#[tokio::test]
async fn failed_audio_retention_keeps_the_output() {
    let dir = tempfile::tempdir().unwrap();
    let muxer = MockMuxer {
        consume_audio: true,
        ..MockMuxer::default()
    };
    let pipeline = Pipeline::new(MockProvider::new(video_info()), MockTransport::default(), muxer);
    let options = PipelineOptions {
        keep_audio_separately: true,
        ..options(dir.path())
    };

    let result = pipeline.run(URL, Some(&"720p".into()), &options).await.unwrap();

    assert_eq!(file_names(dir.path()), ["My_Video_Title_.mp4"]);
    assert_eq!(result.output_video_path, dir.path().join("My_Video_Title_.mp4"));
    assert_eq!(result.retained_audio_path, None);
    assert!(matches!(result.audio_status, AudioStatus::Failed(_)));
}
