//! Caption tracks and their SRT rendering.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use std::sync::LazyLock;

static TIMING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(\d+):)?(\d{1,2}):(\d{2})[.,](\d{3})\s+-->\s+(?:(\d+):)?(\d{1,2}):(\d{2})[.,](\d{3})",
    )
    .expect("timing pattern is valid")
});

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("markup pattern is valid"));

/// A single caption, displayed from `start_ms` to `end_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionCue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// The captions of a video in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionTrack {
    /// The language code, e.g. `en`.
    pub language_code: String,
    pub cues: Vec<CaptionCue>,
}

impl CaptionTrack {
    /// Parses SRT or WebVTT text into a track.
    ///
    /// Blocks without a timing line (WebVTT headers, notes, styles) are skipped, as is
    /// inline markup such as `<c>` or `<00:00:01.000>` tags.
    pub fn parse(language_code: impl Into<String>, text: &str) -> Self {
        let text = text.replace("\r\n", "\n");
        let mut cues = Vec::new();

        for block in text.split("\n\n") {
            let mut lines = block.lines().skip_while(|line| !TIMING.is_match(line));

            let Some(timing) = lines.next().and_then(|line| TIMING.captures(line)) else {
                continue;
            };

            let body: Vec<String> = lines
                .map(|line| MARKUP.replace_all(line, "").trim().to_string())
                .filter(|line| !line.is_empty())
                .collect();
            if body.is_empty() {
                continue;
            }

            cues.push(CaptionCue {
                start_ms: timestamp_ms(&timing, 1),
                end_ms: timestamp_ms(&timing, 5),
                text: body.join("\n"),
            });
        }

        Self {
            language_code: language_code.into(),
            cues,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Renders the track as SRT text.
    pub fn to_srt(&self) -> String {
        let mut srt = String::new();

        for (index, cue) in self.cues.iter().enumerate() {
            // Writing to a String cannot fail.
            let _ = write!(
                srt,
                "{}\n{} --> {}\n{}\n\n",
                index + 1,
                SrtTime(cue.start_ms),
                SrtTime(cue.end_ms),
                cue.text
            );
        }

        srt
    }
}

fn timestamp_ms(captures: &regex::Captures<'_>, first: usize) -> u64 {
    let field = |offset: usize| -> u64 {
        captures
            .get(first + offset)
            .and_then(|value| value.as_str().parse().ok())
            .unwrap_or(0)
    };

    ((field(0) * 60 + field(1)) * 60 + field(2)) * 1000 + field(3)
}

/// Formats milliseconds as an SRT timestamp, `HH:MM:SS,mmm`.
struct SrtTime(u64);

impl fmt::Display for SrtTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0;
        write!(
            f,
            "{:02}:{:02}:{:02},{:03}",
            ms / 3_600_000,
            ms / 60_000 % 60,
            ms / 1000 % 60,
            ms % 1000
        )
    }
}
