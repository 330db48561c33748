//! Sources of video metadata, stream listings and captions.

use crate::error::Result;
use crate::model::{CaptionTrack, VideoInfo};
use std::future::Future;

pub mod ytdlp;

pub use ytdlp::YtDlpProvider;

/// Lists the streams and captions of a video.
pub trait StreamProvider: Send + Sync {
    /// Fetches the title and the available streams of the video at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::MetadataUnavailable`] if the URL is invalid, the
    /// network is unreachable or the video is restricted.
    fn fetch_video(&self, url: &str) -> impl Future<Output = Result<VideoInfo>> + Send;

    /// Fetches the captions of the video at `url` in `language`, `None` if there are none.
    fn fetch_captions(
        &self,
        url: &str,
        language: &str,
    ) -> impl Future<Output = Result<Option<CaptionTrack>>> + Send;
}
