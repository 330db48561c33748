use clap::{Args, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::{error, info, warn};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use yt_merge::config::Config;
use yt_merge::fetcher::deps::ToolInstaller;
use yt_merge::lifecycle::{AudioStatus, SubtitleStatus};
use yt_merge::mux::MuxStrategy;
use yt_merge::progress::{LogSink, ProgressSink, SinkResult};
use yt_merge::provider::StreamProvider;
use yt_merge::{CancellationFlag, Merger, ResolutionLabel};

#[derive(Parser, Clone)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(
        long = "verbosity",
        short,
        global = true,
        default_value = "info",
        value_parser = clap::builder::PossibleValuesParser::new([
            "info", "debug", "error", "none", "full"
        ])
    )]
    pub verbosity: String,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// List the resolutions available as separate video and audio streams.
    Resolutions {
        url: String,

        #[arg(long = "container", short)]
        container: Option<String>,
    },
    /// Download the streams of a video and combine them into one file.
    Download(DownloadArgs),
    /// Install a static ffmpeg build in the bundled tools directory.
    InstallTools {
        #[arg(long = "dir", short)]
        dir: Option<PathBuf>,
    },
}

#[derive(Args, Clone)]
pub struct DownloadArgs {
    pub url: String,

    /// The resolution to download, e.g. 720p. The best available one by default.
    #[arg(long = "resolution", short)]
    pub resolution: Option<String>,

    #[arg(long = "container", short)]
    pub container: Option<String>,

    #[arg(long = "output-dir", short)]
    pub output_dir: Option<PathBuf>,

    /// Keep the downloaded audio as <title>.mp3.
    #[arg(long = "keep-audio", action = clap::ArgAction::SetTrue)]
    pub keep_audio: bool,

    #[arg(
        long = "strategy",
        value_parser = clap::builder::PossibleValuesParser::new(["stream-copy", "reencode"])
    )]
    pub strategy: Option<String>,

    /// The language of the subtitles to save.
    #[arg(long = "subtitles")]
    pub subtitles: Option<String>,

    #[arg(long = "no-subtitles", action = clap::ArgAction::SetTrue, conflicts_with = "subtitles")]
    pub no_subtitles: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Cli::parse();
    let progress = init_logging(&args.verbosity)?;

    let mut config = Config::load().unwrap_or_else(|e| {
        error!("{}", e);
        info!("Using the default configuration.");
        Config::default()
    });

    let outcome = match args.command {
        Command::Resolutions { url, container } => {
            let container = container.unwrap_or_else(|| config.container.clone());
            list_resolutions(&config, &url, &container).await
        }
        Command::Download(download) => {
            apply_overrides(&mut config, &download)?;
            download_video(&config, &download, progress).await
        }
        Command::InstallTools { dir } => {
            let dir = dir.unwrap_or_else(|| config.install_dir());
            ToolInstaller::new(dir)
                .install_ffmpeg()
                .await
                .map(|ffmpeg| info!("ffmpeg installed at {}", ffmpeg.display()))
        }
    };

    if let Err(e) = outcome {
        error!("error: {}: {}", e.kind(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbosity: &str) -> Result<MultiProgress, Box<dyn std::error::Error + Send + Sync>> {
    let level = match verbosity {
        "debug" => log::LevelFilter::Debug,
        "error" => log::LevelFilter::Error,
        "none" => log::LevelFilter::Off,
        "full" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    let logger = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .build();
    let max_level = logger.filter();

    let progress = MultiProgress::new();
    LogWrapper::new(progress.clone(), logger).try_init()?;
    log::set_max_level(max_level);

    Ok(progress)
}

fn apply_overrides(
    config: &mut Config,
    args: &DownloadArgs,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(container) = &args.container {
        config.container = container.clone();
    }
    if let Some(strategy) = &args.strategy {
        config.strategy = strategy.parse::<MuxStrategy>()?;
    }
    if let Some(language) = &args.subtitles {
        config.subtitle_language = language.clone();
        config.download_subtitles = true;
    }
    if args.no_subtitles {
        config.download_subtitles = false;
    }
    if args.keep_audio {
        config.keep_audio = true;
    }
    Ok(())
}

async fn list_resolutions(config: &Config, url: &str, container: &str) -> yt_merge::error::Result<()> {
    let provider = yt_merge::provider_from_config(config)?;
    let info = provider
        .fetch_video(url)
        .await
        .map_err(yt_merge::Error::into_metadata)?;
    let resolutions = info.available_resolutions(container);

    if resolutions.is_empty() {
        warn!("No {} video-only streams available.", container);
    }
    for resolution in resolutions {
        println!("{}", resolution);
    }
    Ok(())
}

async fn download_video(
    config: &Config,
    args: &DownloadArgs,
    progress: MultiProgress,
) -> yt_merge::error::Result<()> {
    let cancellation = CancellationFlag::new();
    let on_interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current stage.");
            on_interrupt.cancel();
        }
    });

    let sink: Arc<dyn ProgressSink> = if std::io::stderr().is_terminal() {
        Arc::new(BarSink::new(progress))
    } else {
        Arc::new(LogSink::new())
    };
    let merger = Merger::from_config(config)?
        .with_sink(sink)
        .with_cancellation(cancellation);

    let resolution = args.resolution.as_deref().map(ResolutionLabel::from);
    let result = merger
        .run(&args.url, resolution.as_ref(), &config.pipeline_options())
        .await?;

    info!("Video saved to {}", result.output_video_path.display());
    match (&result.audio_status, &result.retained_audio_path) {
        (AudioStatus::Kept, Some(audio)) => info!("Audio saved to {}", audio.display()),
        (AudioStatus::Failed(reason), _) => warn!("Audio could not be kept: {}", reason),
        _ => {}
    }
    match &result.subtitle_status {
        SubtitleStatus::Saved => {
            if let Some(path) = &result.subtitle_path {
                info!("Subtitles saved to {}", path.display());
            }
        }
        SubtitleStatus::NotAvailable => info!("No subtitles available."),
        SubtitleStatus::Failed(reason) => warn!("Subtitles could not be saved: {}", reason),
        SubtitleStatus::Skipped => {}
    }
    Ok(())
}

/// Shows job messages on a spinner, and each transfer on its own bar.
struct BarSink {
    progress: MultiProgress,
    status: ProgressBar,
}

impl BarSink {
    fn new(progress: MultiProgress) -> Self {
        let status = progress.add(ProgressBar::new_spinner());
        status.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        status.enable_steady_tick(Duration::from_millis(120));

        Self { progress, status }
    }
}

impl ProgressSink for BarSink {
    fn on_percentage(&self, _value: f64) -> SinkResult {
        Ok(())
    }

    fn on_message(&self, text: &str) -> SinkResult {
        self.status.set_message(text.to_string());
        Ok(())
    }

    fn transfer_sink(&self, label: &str) -> Option<Arc<dyn ProgressSink>> {
        let bar = self.progress.insert_before(&self.status, ProgressBar::new(1000));
        bar.set_style(
            ProgressStyle::with_template("{prefix:>5} [{bar:40.cyan/blue}] {msg:>6}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(label.to_string());

        Some(Arc::new(TransferBar { bar }))
    }
}

impl Drop for BarSink {
    fn drop(&mut self) {
        self.status.finish_and_clear();
    }
}

struct TransferBar {
    bar: ProgressBar,
}

impl ProgressSink for TransferBar {
    fn on_percentage(&self, value: f64) -> SinkResult {
        self.bar.set_position((value * 10.0) as u64);
        self.bar.set_message(format!("{:.1}%", value));
        if value >= 100.0 {
            self.bar.finish();
        }
        Ok(())
    }

    fn on_message(&self, text: &str) -> SinkResult {
        self.bar.set_message(text.to_string());
        Ok(())
    }
}
