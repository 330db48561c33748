//! Naming, retention and cleanup of the files a job produces.
//!
//! Every job owns a [`TempArtifacts`] holding the paths of its temporary downloads. The
//! artifacts are either finalized after a successful mux (video removed, audio removed or
//! kept as `<title>.mp3`) or cleaned up on failure. If neither happens, e.g. when the job's
//! future is dropped, they are removed on drop.

use crate::error::Result;
use crate::model::CaptionTrack;
use crate::provider::StreamProvider;
use crate::utils::file_system;
use chrono::Local;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// The characters that may not appear in a file name.
const RESERVED: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Makes a title safe to use as a file name, replacing each reserved character with `_`.
///
/// # Examples
///
/// ```rust
/// # use yt_merge::lifecycle::sanitize;
/// assert_eq!(sanitize("My/Video:Title?"), "My_Video_Title_");
/// ```
pub fn sanitize(title: &str) -> String {
    title
        .chars()
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .collect()
}

/// A per-job identifier used to name temporary files: the local start time followed by a
/// random suffix, so that jobs started within the same second never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(format!(
            "{}_{}",
            Local::now().format("%Y%m%d%H%M%S"),
            file_system::random_filename(8)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The temporary files of one job.
#[derive(Debug)]
pub struct TempArtifacts {
    job: JobId,
    video: PathBuf,
    audio: PathBuf,
    /// Every path this job may have written, including transport-chosen ones.
    tracked: Mutex<Vec<PathBuf>>,
    settled: AtomicBool,
}

impl TempArtifacts {
    /// Plans the temporary paths of a job in `dir`, using the containers of both streams.
    pub fn new(dir: impl AsRef<Path>, video_extension: &str, audio_extension: &str) -> Self {
        let job = JobId::new();
        let video = dir
            .as_ref()
            .join(format!("video_temp_{}.{}", job, video_extension));
        let audio = dir
            .as_ref()
            .join(format!("audio_temp_{}.{}", job, audio_extension));

        Self {
            tracked: Mutex::new(vec![video.clone(), audio.clone()]),
            job,
            video,
            audio,
            settled: AtomicBool::new(false),
        }
    }

    pub fn job(&self) -> &JobId {
        &self.job
    }

    pub fn video_path(&self) -> &Path {
        &self.video
    }

    pub fn audio_path(&self) -> &Path {
        &self.audio
    }

    /// Registers another path written for this job, so cleanup removes it too.
    pub fn track(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut tracked = self.lock();
        if !tracked.contains(&path) {
            tracked.push(path);
        }
    }

    /// Finalizes a successful job: removes the video temp file, and removes the audio temp
    /// file or, with `keep_audio`, renames it to `<title>.mp3` in `output_dir`.
    ///
    /// The rename does not convert the audio, the file keeps its original framing. A failed
    /// rename is reported in the status, the combined output stays valid.
    ///
    /// # Returns
    ///
    /// The path of the retained audio, if any, and the outcome of keeping it.
    pub async fn finalize(
        &self,
        keep_audio: bool,
        output_dir: impl AsRef<Path>,
        sanitized_title: &str,
    ) -> (Option<PathBuf>, AudioStatus) {
        let outcome = if keep_audio {
            let target = output_dir.as_ref().join(format!("{}.mp3", sanitized_title));
            match tokio::fs::rename(&self.audio, &target).await {
                Ok(()) => {
                    log::info!("Audio kept as {}", target.display());
                    self.lock().retain(|path| path != &self.audio);
                    (Some(target), AudioStatus::Kept)
                }
                Err(e) => {
                    log::warn!("Could not keep audio as {}: {}", target.display(), e);
                    (None, AudioStatus::Failed(e.to_string()))
                }
            }
        } else {
            (None, AudioStatus::Discarded)
        };

        self.cleanup().await;
        outcome
    }

    /// Removes every temporary file of this job that still exists.
    pub async fn cleanup(&self) {
        let paths = self.lock().clone();

        for path in paths {
            file_system::remove_temp_file(&path).await;
        }

        self.settled.store(true, Ordering::Release);
        log::debug!("Cleaned up temporary files of job {}", self.job);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PathBuf>> {
        self.tracked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        if self.settled.load(Ordering::Acquire) {
            return;
        }

        for path in self.lock().iter() {
            match std::fs::remove_file(path) {
                Ok(()) => log::debug!("Removed abandoned temporary file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

/// The outcome of keeping the downloaded audio of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioStatus {
    /// The audio was not requested and was removed.
    Discarded,
    /// The audio was kept at the result's retained audio path.
    Kept,
    /// The audio could not be kept; the job still succeeded.
    Failed(String),
}

impl fmt::Display for AudioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioStatus::Discarded => write!(f, "audio discarded"),
            AudioStatus::Kept => write!(f, "audio kept"),
            AudioStatus::Failed(reason) => write!(f, "audio not kept: {}", reason),
        }
    }
}

/// The outcome of the subtitle step of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleStatus {
    /// The subtitle step was not requested.
    Skipped,
    /// Subtitles were written to the result's subtitle path.
    Saved,
    /// The video has no captions in the requested language.
    NotAvailable,
    /// Captions could not be fetched or written; the job still succeeded.
    Failed(String),
}

impl fmt::Display for SubtitleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubtitleStatus::Skipped => write!(f, "subtitles skipped"),
            SubtitleStatus::Saved => write!(f, "subtitles saved"),
            SubtitleStatus::NotAvailable => write!(f, "no subtitles available"),
            SubtitleStatus::Failed(reason) => write!(f, "subtitles failed: {}", reason),
        }
    }
}

/// Fetches the captions of `url` in `language` and writes them to `<title>.srt`.
///
/// Missing captions and failures are reported in the status, never as an error.
pub async fn write_subtitles<P: StreamProvider>(
    provider: &P,
    url: &str,
    language: &str,
    output_dir: impl AsRef<Path>,
    sanitized_title: &str,
) -> (Option<PathBuf>, SubtitleStatus) {
    let track = match provider.fetch_captions(url, language).await {
        Ok(Some(track)) if !track.is_empty() => track,
        Ok(_) => {
            log::info!("No '{}' subtitles available.", language);
            return (None, SubtitleStatus::NotAvailable);
        }
        Err(e) => {
            log::warn!("Could not fetch '{}' subtitles: {}", language, e);
            return (None, SubtitleStatus::Failed(e.to_string()));
        }
    };

    let path = output_dir.as_ref().join(format!("{}.srt", sanitized_title));
    match save_srt(&track, &path).await {
        Ok(()) => {
            log::info!("Subtitles saved: {}", path.display());
            (Some(path), SubtitleStatus::Saved)
        }
        Err(e) => {
            log::warn!("Could not write subtitles to {}: {}", path.display(), e);
            (None, SubtitleStatus::Failed(e.to_string()))
        }
    }
}

async fn save_srt(track: &CaptionTrack, path: &Path) -> Result<()> {
    tokio::fs::write(path, track.to_srt()).await?;
    Ok(())
}
