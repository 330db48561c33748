#![doc = include_str!("../README.md")]

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::HttpTransport;
use crate::fetcher::deps;
use crate::mux::AnyMuxer;
use crate::pipeline::Pipeline;
use crate::provider::YtDlpProvider;
use std::path::PathBuf;

pub mod config;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod lifecycle;
pub mod model;
pub mod mux;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod utils;

pub use error::{Error, ErrorKind};
pub use model::resolution::{ResolutionLabel, rank_resolutions};
pub use pipeline::{CancellationFlag, PipelineOptions, PipelineResult};

/// The pipeline driving yt-dlp for metadata, HTTP for the transfers and ffmpeg for the mux.
///
/// # Examples
///
/// ```rust,no_run
/// # use yt_merge::Merger;
/// # use yt_merge::config::Config;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::load()?;
/// let merger = Merger::from_config(&config)?;
///
/// let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
/// let result = merger.run(url, None, &config.pipeline_options()).await?;
/// println!("Saved {}", result.output_video_path.display());
/// # Ok(())
/// # }
/// ```
pub type Merger = Pipeline<YtDlpProvider, HttpTransport, AnyMuxer>;

impl Merger {
    /// Creates the pipeline described by a configuration, locating the tools it needs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`] if yt-dlp or ffmpeg could not be located.
    pub fn from_config(config: &Config) -> Result<Self> {
        let ffmpeg = resolve_tool(config, "ffmpeg", config.ffmpeg_path.as_ref())?;

        Ok(Pipeline::new(
            provider_from_config(config)?,
            HttpTransport::new(config.retry_attempts),
            AnyMuxer::new(config.strategy, ffmpeg, config.process_timeout()),
        ))
    }
}

/// Creates the yt-dlp provider described by a configuration.
///
/// # Errors
///
/// Returns [`Error::ToolNotFound`] if yt-dlp could not be located.
pub fn provider_from_config(config: &Config) -> Result<YtDlpProvider> {
    let executable = resolve_tool(config, "yt-dlp", config.yt_dlp_path.as_ref())?;

    Ok(YtDlpProvider::new(executable, config.process_timeout())
        .with_retry_attempts(config.retry_attempts))
}

fn resolve_tool(config: &Config, name: &str, configured: Option<&PathBuf>) -> Result<PathBuf> {
    match configured {
        Some(path) if path.is_file() => Ok(path.clone()),
        Some(path) => {
            log::warn!(
                "Configured {} path {} does not exist, searching for it",
                name,
                path.display()
            );
            deps::locate_tool(name, &config.tool_dirs())
        }
        None => deps::locate_tool(name, &config.tool_dirs()),
    }
}
