//! Resolution labels such as `1080p`, and their ranking.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A human-readable resolution label of the form `<integer>p`, e.g. `720p`.
///
/// Labels that do not follow this form are kept as they are and rank below every
/// well-formed label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolutionLabel(String);

impl ResolutionLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Builds the label of a vertical pixel count, e.g. `720` becomes `720p`.
    pub fn from_height(height: u32) -> Self {
        Self(format!("{}p", height))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The vertical pixel count, or `None` if the label is malformed.
    pub fn height(&self) -> Option<u32> {
        self.0.trim().strip_suffix('p')?.parse().ok()
    }

    /// The sort key: the height, or `-1` for malformed labels.
    pub fn rank(&self) -> i64 {
        self.height().map(i64::from).unwrap_or(-1)
    }
}

impl fmt::Display for ResolutionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResolutionLabel {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Deduplicates raw resolution labels and orders them by descending resolution.
///
/// Missing and empty labels are dropped. Malformed labels are kept and ranked last.
/// Labels of equal rank keep their input order.
///
/// # Examples
///
/// ```rust
/// # use yt_merge::model::resolution::rank_resolutions;
/// let ranked = rank_resolutions([Some("720p"), None, Some("1080p"), Some(""), Some("720p")]);
/// let labels: Vec<&str> = ranked.iter().map(|label| label.as_str()).collect();
///
/// assert_eq!(labels, ["1080p", "720p"]);
/// ```
pub fn rank_resolutions<I, S>(labels: I) -> Vec<ResolutionLabel>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut ranked: Vec<ResolutionLabel> = labels
        .into_iter()
        .flatten()
        .filter(|label| !label.as_ref().trim().is_empty())
        .filter(|label| seen.insert(label.as_ref().to_string()))
        .map(|label| ResolutionLabel::new(label.as_ref()))
        .collect();

    ranked.sort_by_key(|label| std::cmp::Reverse(label.rank()));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_strs(labels: &[ResolutionLabel]) -> Vec<&str> {
        labels.iter().map(ResolutionLabel::as_str).collect()
    }

    #[test]
    fn ranks_by_descending_height_and_drops_empty_labels() {
        let ranked = rank_resolutions([Some("720p"), Some("1080p"), None, Some(""), Some("x")]);

        assert_eq!(as_strs(&ranked), ["1080p", "720p", "x"]);
    }

    #[test]
    fn removes_duplicates() {
        let ranked = rank_resolutions([Some("360p"), Some("360p"), Some("144p"), Some("360p")]);

        assert_eq!(as_strs(&ranked), ["360p", "144p"]);
    }

    #[test]
    fn malformed_labels_keep_their_order_at_the_bottom() {
        let ranked = rank_resolutions([Some("hd"), Some("240p"), Some("p"), Some("1440p60")]);

        assert_eq!(as_strs(&ranked), ["240p", "hd", "p", "1440p60"]);
    }

    #[test]
    fn numeric_not_lexicographic_order() {
        let ranked = rank_resolutions([Some("720p"), Some("2160p"), Some("1080p")]);

        assert_eq!(as_strs(&ranked), ["2160p", "1080p", "720p"]);
    }

    #[test]
    fn parses_heights() {
        assert_eq!(ResolutionLabel::from("1080p").height(), Some(1080));
        assert_eq!(ResolutionLabel::from_height(480).as_str(), "480p");
        assert_eq!(ResolutionLabel::from("abc").rank(), -1);
    }
}
