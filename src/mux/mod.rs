//! Combining a video-only and an audio-only file into one container.
//!
//! Two strategies are available, see [`MuxStrategy`]. Both write `<title>.<container>` and
//! overwrite an existing file of that name.

use crate::error::{Error, Result};
use crate::fetcher::deps;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub mod reencode;
pub mod stream_copy;

pub use reencode::{FfmpegToolkit, MediaHandle, MediaToolkit, ReencodeMuxer};
pub use stream_copy::StreamCopyMuxer;

/// How the two downloaded files are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MuxStrategy {
    /// Copies both bitstreams into the new container, without re-encoding.
    #[default]
    StreamCopy,
    /// Decodes both inputs and encodes a new combined file.
    Reencode,
}

impl fmt::Display for MuxStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxStrategy::StreamCopy => write!(f, "stream-copy"),
            MuxStrategy::Reencode => write!(f, "reencode"),
        }
    }
}

impl FromStr for MuxStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stream-copy" => Ok(MuxStrategy::StreamCopy),
            "reencode" => Ok(MuxStrategy::Reencode),
            other => Err(Error::Config(format!("unknown mux strategy '{}'", other))),
        }
    }
}

/// The inputs of one mux.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    /// The sanitized title the output is named after.
    pub output_title: String,
    pub keep_audio_separately: bool,
}

impl MergeRequest {
    /// The output path of this request: `<title>.<container>` in `output_dir`.
    pub fn output_path(&self, output_dir: impl AsRef<Path>, container: &str) -> PathBuf {
        output_dir
            .as_ref()
            .join(format!("{}.{}", self.output_title, container))
    }
}

/// Combines the video and audio of a [`MergeRequest`] into `output`.
pub trait Muxer: Send + Sync {
    /// # Errors
    ///
    /// Returns [`Error::MuxFailed`] with the multiplexer's diagnostic output if the files
    /// could not be combined, or [`Error::ToolNotFound`] if the multiplexer is missing.
    /// No partial output is left behind.
    fn mux(&self, request: &MergeRequest, output: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// The muxer selected by configuration.
#[derive(Debug, Clone)]
pub enum AnyMuxer {
    StreamCopy(StreamCopyMuxer),
    Reencode(ReencodeMuxer<FfmpegToolkit>),
}

impl AnyMuxer {
    /// Creates the muxer of `strategy`, driving the ffmpeg binary at `ffmpeg`.
    pub fn new(strategy: MuxStrategy, ffmpeg: impl Into<PathBuf>, timeout: Duration) -> Self {
        match strategy {
            MuxStrategy::StreamCopy => AnyMuxer::StreamCopy(StreamCopyMuxer::new(ffmpeg, timeout)),
            MuxStrategy::Reencode => {
                AnyMuxer::Reencode(ReencodeMuxer::new(FfmpegToolkit::new(ffmpeg, timeout)))
            }
        }
    }

    /// Creates the muxer of `strategy`, locating ffmpeg with [`deps::locate_tool`].
    pub fn locate(strategy: MuxStrategy, extra_dirs: &[PathBuf], timeout: Duration) -> Result<Self> {
        let ffmpeg = deps::locate_tool("ffmpeg", extra_dirs)?;
        Ok(Self::new(strategy, ffmpeg, timeout))
    }

    pub fn strategy(&self) -> MuxStrategy {
        match self {
            AnyMuxer::StreamCopy(_) => MuxStrategy::StreamCopy,
            AnyMuxer::Reencode(_) => MuxStrategy::Reencode,
        }
    }
}

impl Muxer for AnyMuxer {
    async fn mux(&self, request: &MergeRequest, output: &Path) -> Result<()> {
        match self {
            AnyMuxer::StreamCopy(muxer) => muxer.mux(request, output).await,
            AnyMuxer::Reencode(muxer) => muxer.mux(request, output).await,
        }
    }
}

/// Writes `title` into the metadata of an MP4 family file.
/// Files of other containers are left untouched.
///
/// # Errors
///
/// Returns an error if the existing tag could not be read or the new one written.
pub async fn tag_output(path: impl AsRef<Path>, title: &str) -> Result<()> {
    let path = path.as_ref().to_path_buf();
    let is_mp4 = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext, "mp4" | "m4a" | "m4v"));
    if !is_mp4 {
        log::debug!("Not tagging {}, unsupported container", path.display());
        return Ok(());
    }

    let title = title.to_string();
    tokio::task::spawn_blocking(move || {
        let mut tag = mp4ameta::Tag::read_from_path(&path)
            .map_err(|e| Error::Unknown(format!("Failed to read MP4 tags: {}", e)))?;

        tag.set_title(title);
        tag.write_to_path(&path)
            .map_err(|e| Error::Unknown(format!("Failed to write MP4 tags: {}", e)))?;

        log::debug!("Tagged {}", path.display());
        Ok(())
    })
    .await?
}

/// Removes a partial output left by a failed mux.
async fn discard_partial(output: &Path) {
    if tokio::fs::try_exists(output).await.unwrap_or(false) {
        crate::utils::file_system::remove_temp_file(output).await;
    }
}
