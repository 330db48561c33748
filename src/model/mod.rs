//! The models used to represent the data returned by a stream provider.
//!
//! The represented data is the video information, its streams, and its caption tracks.

use crate::model::resolution::{ResolutionLabel, rank_resolutions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod caption;
pub mod resolution;
pub mod selector;

pub use caption::{CaptionCue, CaptionTrack};
pub use selector::{SelectedStreams, select_streams};

/// What a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// A video track without audio.
    VideoOnly,
    /// An audio track without video.
    AudioOnly,
    /// Both tracks in one stream.
    Muxed,
}

/// A remote media stream, as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// The provider's identifier of the stream, e.g. yt-dlp's `format_id`.
    pub format_id: String,
    /// Where the transport fetches the stream from.
    pub url: String,
    /// The resolution label of video streams, e.g. `720p`.
    pub resolution: Option<String>,
    pub kind: StreamKind,
    /// The file extension of the stream's container, e.g. `mp4` or `m4a`.
    pub container_extension: String,
    /// The size of the stream, when the provider knows it. May be an estimate.
    pub total_size_bytes: Option<u64>,
    /// The headers the provider requires on the request for `url`.
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
}

impl StreamDescriptor {
    pub fn is_video_only(&self) -> bool {
        self.kind == StreamKind::VideoOnly
    }

    pub fn is_audio_only(&self) -> bool {
        self.kind == StreamKind::AudioOnly
    }

    /// Whether the stream's container belongs to the given container family.
    pub fn matches_container(&self, container: &str) -> bool {
        container_family(&self.container_extension) == container_family(container)
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stream(id={}, kind={:?}, ext={}, resolution={})",
            self.format_id,
            self.kind,
            self.container_extension,
            self.resolution.as_deref().unwrap_or("none")
        )
    }
}

/// Returns the container family of an extension: audio-only MP4 streams use `m4a`, and
/// audio-only WebM streams may use `weba`, but they mux into `mp4` and `webm` outputs.
pub fn container_family(extension: &str) -> String {
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();

    match extension.as_str() {
        "m4a" | "m4v" => "mp4".to_string(),
        "weba" => "webm".to_string(),
        _ => extension,
    }
}

/// A video as returned by the provider: its title and every stream it offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// The provider's identifier of the video.
    pub id: String,
    /// The raw title. Never used as a file name without sanitizing it first.
    pub title: String,
    /// The available streams, in the provider's preference order (best first).
    pub streams: Vec<StreamDescriptor>,
}

impl VideoInfo {
    /// Returns the resolutions offered by the video-only streams of a container, best first.
    pub fn available_resolutions(&self, container: &str) -> Vec<ResolutionLabel> {
        rank_resolutions(
            self.streams
                .iter()
                .filter(|stream| stream.is_video_only() && stream.matches_container(container))
                .map(|stream| stream.resolution.as_deref()),
        )
    }
}

impl fmt::Display for VideoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Video(id={}, title={}, streams={})",
            self.id,
            self.title,
            self.streams.len()
        )
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn audio_m4a_belongs_to_mp4_family() {
        assert!(audio_stream("140", "m4a").matches_container("mp4"));
        assert!(!audio_stream("251", "webm").matches_container("mp4"));
        assert_eq!(container_family(".MP4"), "mp4");
    }

    #[test]
    fn resolutions_come_from_video_only_streams_of_the_container() {
        let mut muxed = video_stream("18", "360p", "mp4");
        muxed.kind = StreamKind::Muxed;

        let video = VideoInfo {
            id: "abc".to_string(),
            title: "Title".to_string(),
            streams: vec![
                video_stream("136", "720p", "mp4"),
                video_stream("248", "1080p", "webm"),
                video_stream("137", "1080p", "mp4"),
                video_stream("398", "720p", "mp4"),
                audio_stream("140", "m4a"),
                muxed,
            ],
        };

        let labels: Vec<String> = video
            .available_resolutions("mp4")
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(labels, ["1080p", "720p"]);
    }
}
