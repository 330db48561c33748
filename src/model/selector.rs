//! Resolves a requested resolution to one video-only and one audio-only stream.

use crate::error::{Error, Result};
use crate::model::StreamDescriptor;
use crate::model::resolution::{ResolutionLabel, rank_resolutions};

/// The pair of streams a job downloads and combines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedStreams<'a> {
    pub video: &'a StreamDescriptor,
    pub audio: &'a StreamDescriptor,
}

/// Picks the video-only stream of the requested resolution and container, and the first
/// audio-only stream of the container in provider order.
///
/// Without a requested resolution, the best resolution available in the container is used.
///
/// # Errors
///
/// Returns [`Error::StreamsUnavailable`] if either stream is missing. Nothing must be
/// downloaded in that case.
pub fn select_streams<'a>(
    streams: &'a [StreamDescriptor],
    resolution: Option<&ResolutionLabel>,
    container: &str,
) -> Result<SelectedStreams<'a>> {
    let target = match resolution {
        Some(label) => label.clone(),
        None => {
            let ranked = rank_resolutions(
                video_candidates(streams, container).map(|stream| stream.resolution.as_deref()),
            );
            ranked.into_iter().next().ok_or_else(|| {
                Error::StreamsUnavailable(format!("no {} video-only stream available", container))
            })?
        }
    };

    let video = video_candidates(streams, container)
        .find(|stream| stream.resolution.as_deref() == Some(target.as_str()))
        .ok_or_else(|| {
            Error::StreamsUnavailable(format!("no {} video-only stream at {}", container, target))
        })?;

    let audio = streams
        .iter()
        .find(|stream| stream.is_audio_only() && stream.matches_container(container))
        .ok_or_else(|| {
            Error::StreamsUnavailable(format!("no {} audio-only stream available", container))
        })?;

    log::debug!("Selected video {} and audio {}", video, audio);

    Ok(SelectedStreams { video, audio })
}

fn video_candidates<'a>(
    streams: &'a [StreamDescriptor],
    container: &str,
) -> impl Iterator<Item = &'a StreamDescriptor> {
    streams
        .iter()
        .filter(move |stream| stream.is_video_only() && stream.matches_container(container))
}
