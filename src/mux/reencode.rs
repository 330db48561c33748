//! The decode and re-encode strategy.
//!
//! Inputs are opened through a [`MediaToolkit`] as scoped handles. A handle holds its input
//! open until it is dropped, which happens when [`ReencodeMuxer::mux`] returns, whether the
//! write succeeded or not.

use crate::error::Result;
use crate::executor::Executor;
use crate::mux::stream_copy::path_str;
use crate::mux::{MergeRequest, Muxer, discard_partial};
use std::fs::File;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An opened media input.
pub trait MediaHandle: Send + Sync {
    fn path(&self) -> &Path;
}

/// Opens media inputs and encodes combined outputs.
pub trait MediaToolkit: Send + Sync {
    type Handle: MediaHandle;

    /// Opens an input for reading.
    fn open(&self, path: &Path) -> Result<Self::Handle>;

    /// Encodes the video track of `video` and the audio track of `audio` into `output`.
    fn write_combined(
        &self,
        video: &Self::Handle,
        audio: &Self::Handle,
        output: &Path,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Re-encodes both inputs into a new file.
#[derive(Debug, Clone)]
pub struct ReencodeMuxer<T: MediaToolkit> {
    toolkit: T,
}

impl<T: MediaToolkit> ReencodeMuxer<T> {
    pub fn new(toolkit: T) -> Self {
        Self { toolkit }
    }

    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }
}

impl<T: MediaToolkit> Muxer for ReencodeMuxer<T> {
    async fn mux(&self, request: &MergeRequest, output: &Path) -> Result<()> {
        log::debug!(
            "Re-encoding {} and {} into {}",
            request.video_path.display(),
            request.audio_path.display(),
            output.display()
        );

        let video = self
            .toolkit
            .open(&request.video_path)
            .map_err(|e| e.into_mux())?;
        let audio = self
            .toolkit
            .open(&request.audio_path)
            .map_err(|e| e.into_mux())?;

        if let Err(e) = self.toolkit.write_combined(&video, &audio, output).await {
            discard_partial(output).await;
            return Err(e.into_mux());
        }

        Ok(())
    }
}

/// An input held open for the duration of an ffmpeg re-encode.
#[derive(Debug)]
pub struct FfmpegInput {
    path: PathBuf,
    _file: File,
}

impl MediaHandle for FfmpegInput {
    fn path(&self) -> &Path {
        &self.path
    }
}

/// Re-encodes with ffmpeg: H.264 video and AAC audio, cut to the shorter track.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegToolkit {
    /// The path to the ffmpeg binary.
    pub ffmpeg: PathBuf,
    /// The timeout of one encode.
    pub timeout: Duration,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout,
        }
    }

    pub fn command_args(&self, video: &Path, audio: &Path, output: &Path) -> Result<Vec<String>> {
        Ok(crate::utils::to_owned(vec![
            "-y",
            "-i",
            path_str(video, "video")?,
            "-i",
            path_str(audio, "audio")?,
            "-map",
            "0:v:0",
            "-map",
            "1:a:0",
            "-c:v",
            "libx264",
            "-c:a",
            "aac",
            "-shortest",
            path_str(output, "output")?,
        ]))
    }
}

impl MediaToolkit for FfmpegToolkit {
    type Handle = FfmpegInput;

    fn open(&self, path: &Path) -> Result<FfmpegInput> {
        Ok(FfmpegInput {
            path: path.to_path_buf(),
            _file: File::open(path)?,
        })
    }

    async fn write_combined(
        &self,
        video: &FfmpegInput,
        audio: &FfmpegInput,
        output: &Path,
    ) -> Result<()> {
        let executor = Executor {
            executable_path: self.ffmpeg.clone(),
            timeout: self.timeout,
            args: self.command_args(video.path(), audio.path(), output)?,
        };

        executor.execute().await?;
        Ok(())
    }
}
