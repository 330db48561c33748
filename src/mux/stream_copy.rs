use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::fetcher::deps;
use crate::mux::{MergeRequest, Muxer, discard_partial};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Copies the video and audio bitstreams into a new container with ffmpeg.
///
/// The samples are not re-encoded, so the output has the quality of the inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamCopyMuxer {
    /// The path to the ffmpeg binary.
    pub ffmpeg: PathBuf,
    /// The timeout of one mux.
    pub timeout: Duration,
}

impl StreamCopyMuxer {
    pub fn new(ffmpeg: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout,
        }
    }

    /// Creates a muxer with ffmpeg located by [`deps::locate_tool`].
    pub fn locate(extra_dirs: &[PathBuf], timeout: Duration) -> Result<Self> {
        Ok(Self::new(deps::locate_tool("ffmpeg", extra_dirs)?, timeout))
    }

    /// The ffmpeg arguments for a request.
    pub fn command_args(&self, request: &MergeRequest, output: &Path) -> Result<Vec<String>> {
        let video = path_str(&request.video_path, "video")?;
        let audio = path_str(&request.audio_path, "audio")?;
        let output = path_str(output, "output")?;

        Ok(crate::utils::to_owned(vec![
            "-y",
            "-i",
            video,
            "-i",
            audio,
            "-c:v",
            "copy",
            "-c:a",
            "copy",
            "-strict",
            "experimental",
            output,
        ]))
    }
}

impl Muxer for StreamCopyMuxer {
    async fn mux(&self, request: &MergeRequest, output: &Path) -> Result<()> {
        log::debug!(
            "Stream-copying {} and {} into {}",
            request.video_path.display(),
            request.audio_path.display(),
            output.display()
        );

        let executor = Executor {
            executable_path: self.ffmpeg.clone(),
            timeout: self.timeout,
            args: self.command_args(request, output)?,
        };

        if let Err(e) = executor.execute().await {
            discard_partial(output).await;
            return Err(e.into_mux());
        }

        Ok(())
    }
}

pub(crate) fn path_str<'p>(path: &'p Path, role: &str) -> Result<&'p str> {
    path.to_str()
        .ok_or_else(|| Error::Path(format!("Invalid {} path: {}", role, path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn request(dir: &Path) -> MergeRequest {
        MergeRequest {
            video_path: dir.join("video_temp.mp4"),
            audio_path: dir.join("audio_temp.m4a"),
            output_title: "Title".to_string(),
            keep_audio_separately: false,
        }
    }

    #[test]
    fn builds_stream_copy_command() {
        let muxer = StreamCopyMuxer::new("ffmpeg", Duration::from_secs(1));
        let args = muxer
            .command_args(&request(Path::new("/tmp")), Path::new("/tmp/Title.mp4"))
            .unwrap();

        assert_eq!(
            args,
            [
                "-y",
                "-i",
                "/tmp/video_temp.mp4",
                "-i",
                "/tmp/audio_temp.m4a",
                "-c:v",
                "copy",
                "-c:a",
                "copy",
                "-strict",
                "experimental",
                "/tmp/Title.mp4"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_multiplexer_reports_diagnostic_and_removes_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = dir.path().join("ffmpeg");
        let output = dir.path().join("Title.mp4");
        std::fs::write(
            &ffmpeg,
            format!(
                "#!/bin/sh\necho partial > '{}'\necho 'moov atom not found' >&2\nexit 1\n",
                output.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();

        let muxer = StreamCopyMuxer::new(&ffmpeg, Duration::from_secs(10));
        let error = muxer.mux(&request(dir.path()), &output).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::MuxFailed);
        assert_eq!(error.diagnostic(), Some("moov atom not found"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn missing_multiplexer_is_a_mux_failure() {
        let muxer = StreamCopyMuxer::new("/nonexistent/ffmpeg", Duration::from_secs(1));
        let error = muxer
            .mux(&request(Path::new("/tmp")), Path::new("/tmp/never-written.mp4"))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::MuxFailed);
    }
}
