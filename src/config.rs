//! User configuration, read from `<config dir>/yt-merge/config.toml`.

use crate::error::{Error, Result};
use crate::mux::MuxStrategy;
use crate::pipeline::PipelineOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The name of the application's configuration directory.
pub const APP_DIR: &str = "yt-merge";

/// The configuration of the tool. Missing keys take their default value.
///
/// # Examples
///
/// ```rust
/// # use yt_merge::config::Config;
/// let config: Config = toml::from_str("container = \"webm\"\nkeep_audio = true").unwrap();
///
/// assert_eq!(config.container, "webm");
/// assert_eq!(config.subtitle_language, "en");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_dir: PathBuf,
    pub container: String,
    pub strategy: MuxStrategy,
    pub subtitle_language: String,
    pub download_subtitles: bool,
    pub keep_audio: bool,
    /// The timeout of each external process, in seconds.
    pub process_timeout_secs: u64,
    pub ffmpeg_path: Option<PathBuf>,
    pub yt_dlp_path: Option<PathBuf>,
    /// A directory of bundled tools, searched after the system path.
    pub libs_dir: Option<PathBuf>,
    pub retry_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            container: "mp4".to_string(),
            strategy: MuxStrategy::StreamCopy,
            subtitle_language: "en".to_string(),
            download_subtitles: true,
            keep_audio: false,
            process_timeout_secs: 3600,
            ffmpeg_path: None,
            yt_dlp_path: None,
            libs_dir: None,
            retry_attempts: 3,
        }
    }
}

impl Config {
    /// The path of the configuration file, if the platform has a configuration directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    /// Loads the configuration file, or the defaults if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but could not be read or parsed.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    /// Loads the configuration file at `path`, or the defaults if it does not exist or is empty.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            log::debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Malformed config file {}: {}", path.display(), e)))
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    /// The directories searched for bundled tools after the system path.
    pub fn tool_dirs(&self) -> Vec<PathBuf> {
        self.libs_dir.iter().cloned().collect()
    }

    /// The default directory of tools installed by `install-tools`.
    pub fn install_dir(&self) -> PathBuf {
        self.libs_dir
            .clone()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join(APP_DIR).join("libs")))
            .unwrap_or_else(|| PathBuf::from("libs"))
    }

    /// The job options described by this configuration.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            output_dir: self.output_dir.clone(),
            container: self.container.clone(),
            keep_audio_separately: self.keep_audio,
            subtitle_language: self
                .download_subtitles
                .then(|| self.subtitle_language.clone()),
            tag_metadata: true,
        }
    }
}
