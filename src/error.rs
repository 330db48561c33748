//! The errors that can occur.

use crate::utils::platform::{Architecture, Platform};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The possible errors that can occur.
#[derive(Debug, Error)]
pub enum Error {
    /// The provider could not list the streams or captions of a video.
    #[error("Video metadata is unavailable: {0}")]
    MetadataUnavailable(String),
    /// No matching video or audio stream exists for the request.
    #[error("Suitable streams not found: {0}")]
    StreamsUnavailable(String),
    /// A stream could not be transferred to disk.
    #[error("Transfer failed: {0}")]
    TransferFailed(String),
    /// The audio and video files could not be combined.
    #[error("Failed to combine video and audio: {reason}")]
    MuxFailed {
        /// A short description of what failed.
        reason: String,
        /// The diagnostic output of the multiplexer, if any.
        diagnostic: String,
    },
    /// The multiplexer was found neither on the system path nor beside the application.
    #[error("Could not locate '{0}' on the system path or in the bundled tools directory")]
    ToolNotFound(String),
    /// The job was cancelled before it could finish.
    #[error("The job was cancelled")]
    Cancelled,

    /// An error occurred while running the runtime.
    #[error("An error occurred while running the runtime: {0}")]
    Runtime(#[from] tokio::task::JoinError),
    /// An error occurred while interacting with the file system.
    #[error("An IO error occurred: {0}")]
    IO(#[from] std::io::Error),
    /// An error occurred while zipping or unzipping a file.
    #[error("An error occurred while extracting the archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// An error occurred while fetching.
    #[error("An error occurred while fetching: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// An error occurred while parsing JSON.
    #[error("An error occurred while parsing JSON: {0}")]
    Serde(#[from] serde_json::Error),
    /// The configuration file could not be read.
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// No ffmpeg build exists for the platform.
    #[error("No ffmpeg binary found for platform {0}/{1}")]
    Binary(Platform, Architecture),
    /// A process exited unsuccessfully.
    #[error("Process failed with code {code}: {stderr}")]
    Command {
        /// The exit code, `-1` when killed by a signal.
        code: i32,
        /// The captured standard error.
        stderr: String,
    },
    /// An error occurred manipulating a path.
    #[error("An invalid path was provided: {0}")]
    Path(String),
    /// An error occurred due to a timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// An unknown error occurred.
    #[error("An unknown error occurred: {0}")]
    Unknown(String),
}

/// The structured kind of an [`Error`], as reported to callers of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MetadataUnavailable,
    StreamsUnavailable,
    TransferFailed,
    MuxFailed,
    ToolNotFound,
    Cancelled,
    Config,
    /// A low-level fault that was not attributed to a pipeline stage.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MetadataUnavailable => "MetadataUnavailable",
            ErrorKind::StreamsUnavailable => "StreamsUnavailable",
            ErrorKind::TransferFailed => "TransferFailed",
            ErrorKind::MuxFailed => "MuxFailed",
            ErrorKind::ToolNotFound => "ToolNotFound",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Config => "Config",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Returns the structured kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MetadataUnavailable(_) => ErrorKind::MetadataUnavailable,
            Error::StreamsUnavailable(_) => ErrorKind::StreamsUnavailable,
            Error::TransferFailed(_) => ErrorKind::TransferFailed,
            Error::MuxFailed { .. } => ErrorKind::MuxFailed,
            Error::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Config(_) => ErrorKind::Config,
            _ => ErrorKind::Internal,
        }
    }

    /// Returns the multiplexer diagnostic carried by a [`Error::MuxFailed`].
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Error::MuxFailed { diagnostic, .. } => Some(diagnostic.as_str()),
            _ => None,
        }
    }

    /// Attributes a low-level error to the metadata stage.
    /// Errors that already carry a pipeline kind are kept as they are.
    pub fn into_metadata(self) -> Self {
        match self.kind() {
            ErrorKind::Internal => Error::MetadataUnavailable(self.to_string()),
            _ => self,
        }
    }

    /// Attributes a low-level error to the download stage.
    pub fn into_transfer(self) -> Self {
        match self.kind() {
            ErrorKind::Internal => Error::TransferFailed(self.to_string()),
            _ => self,
        }
    }

    /// Attributes a low-level error to the mux stage, keeping the process output as diagnostic.
    pub fn into_mux(self) -> Self {
        match self {
            Error::Command { code, stderr } => Error::MuxFailed {
                reason: format!("multiplexer exited with code {}", code),
                diagnostic: stderr,
            },
            Error::Timeout(duration) => Error::MuxFailed {
                reason: format!("multiplexer timed out after {:?}", duration),
                diagnostic: String::new(),
            },
            other if other.kind() == ErrorKind::Internal => Error::MuxFailed {
                reason: other.to_string(),
                diagnostic: String::new(),
            },
            other => other,
        }
    }
}
