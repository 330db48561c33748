//! A [`StreamProvider`] backed by the `yt-dlp` executable.

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::fetcher::Fetcher;
use crate::model::resolution::ResolutionLabel;
use crate::model::{CaptionTrack, StreamDescriptor, StreamKind, VideoInfo};
use crate::provider::StreamProvider;
use crate::utils;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// The caption formats understood by [`CaptionTrack::parse`], by preference.
const CAPTION_FORMATS: [&str; 2] = ["srt", "vtt"];

/// The protocols of formats served as a single file, which the transport can fetch.
const DIRECT_PROTOCOLS: [&str; 2] = ["https", "http"];

/// Fetches video information by running `yt-dlp --dump-json`.
///
/// The output of each URL is kept for the lifetime of the provider, so fetching captions
/// after the streams does not run yt-dlp again.
#[derive(Debug)]
pub struct YtDlpProvider {
    /// The path to the yt-dlp binary.
    pub executable: PathBuf,
    /// The timeout of one yt-dlp run.
    pub timeout: Duration,
    /// The number of attempts when downloading caption files.
    pub retry_attempts: usize,
    cache: Mutex<HashMap<String, RawVideo>>,
}

impl YtDlpProvider {
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
            retry_attempts: 3,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_attempts(mut self, attempts: usize) -> Self {
        self.retry_attempts = attempts;
        self
    }

    async fn raw_video(&self, url: &str) -> Result<RawVideo> {
        if let Some(cached) = self.cached(url) {
            log::debug!("Using cached information of {}", url);
            return Ok(cached);
        }

        let executor = Executor {
            executable_path: self.executable.clone(),
            timeout: self.timeout,
            args: utils::to_owned(vec!["--no-progress", "--no-playlist", "--dump-json", url]),
        };

        let output = executor.execute().await?;
        let raw = RawVideo::from_json(&output.stdout)?;

        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(url.to_string(), raw.clone());
        Ok(raw)
    }

    fn cached(&self, url: &str) -> Option<RawVideo> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(url)
            .cloned()
    }
}

impl StreamProvider for YtDlpProvider {
    async fn fetch_video(&self, url: &str) -> Result<VideoInfo> {
        let raw = self.raw_video(url).await.map_err(Error::into_metadata)?;
        let info = raw.to_video_info();

        log::debug!("Fetched {}", info);
        Ok(info)
    }

    async fn fetch_captions(&self, url: &str, language: &str) -> Result<Option<CaptionTrack>> {
        let raw = self.raw_video(url).await.map_err(Error::into_metadata)?;
        let Some(caption) = raw.caption(language) else {
            return Ok(None);
        };

        log::debug!("Fetching '{}' {} captions", language, caption.ext);
        let text = Fetcher::new(&caption.url)
            .with_retry_attempts(self.retry_attempts)
            .fetch_text()
            .await
            .map_err(Error::into_metadata)?;

        Ok(Some(CaptionTrack::parse(language, &text)))
    }
}

/// The subset of yt-dlp's JSON output used here.
#[derive(Debug, Clone, Deserialize)]
struct RawVideo {
    id: String,
    title: String,
    #[serde(default)]
    formats: Vec<RawFormat>,
    #[serde(default)]
    subtitles: HashMap<String, Vec<RawCaption>>,
    #[serde(default)]
    automatic_captions: HashMap<String, Vec<RawCaption>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFormat {
    format_id: String,
    url: Option<String>,
    ext: String,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
    protocol: Option<String>,
    #[serde(default)]
    http_headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCaption {
    ext: String,
    url: String,
}

impl RawVideo {
    fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json.trim())?)
    }

    /// Converts the formats to stream descriptors, best first.
    ///
    /// yt-dlp lists formats from worst to best. Formats without a URL, with neither video
    /// nor audio (e.g. storyboards), or served as segments (HLS, DASH) are skipped.
    fn to_video_info(&self) -> VideoInfo {
        let streams = self
            .formats
            .iter()
            .rev()
            .filter_map(RawFormat::to_descriptor)
            .collect();

        VideoInfo {
            id: self.id.clone(),
            title: self.title.clone(),
            streams,
        }
    }

    /// Finds the caption file of a language, uploaded subtitles before automatic ones.
    fn caption(&self, language: &str) -> Option<&RawCaption> {
        [&self.subtitles, &self.automatic_captions]
            .into_iter()
            .filter_map(|captions| captions.get(language))
            .find_map(|files| {
                CAPTION_FORMATS
                    .iter()
                    .find_map(|format| files.iter().find(|file| file.ext == *format))
            })
    }
}

impl RawFormat {
    fn to_descriptor(&self) -> Option<StreamDescriptor> {
        let url = self.url.as_ref().filter(|url| !url.is_empty())?;
        if !self.is_direct() {
            log::debug!("Skipping format {} served over {:?}", self.format_id, self.protocol);
            return None;
        }

        let has_video = has_codec(&self.vcodec);
        let has_audio = has_codec(&self.acodec);

        let kind = match (has_video, has_audio) {
            (true, false) => StreamKind::VideoOnly,
            (false, true) => StreamKind::AudioOnly,
            (true, true) => StreamKind::Muxed,
            (false, false) => return None,
        };

        Some(StreamDescriptor {
            format_id: self.format_id.clone(),
            url: url.clone(),
            resolution: self
                .height
                .filter(|_| has_video)
                .map(|height| ResolutionLabel::from_height(height).to_string()),
            kind,
            container_extension: self.ext.clone(),
            total_size_bytes: self
                .filesize
                .or_else(|| self.filesize_approx.map(|size| size as u64)),
            http_headers: self.http_headers.clone(),
        })
    }

    /// A missing protocol is taken from the URL's scheme.
    fn is_direct(&self) -> bool {
        match &self.protocol {
            Some(protocol) => DIRECT_PROTOCOLS.contains(&protocol.as_str()),
            None => true,
        }
    }
}

fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref().is_some_and(|codec| codec != "none")
}
