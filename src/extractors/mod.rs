use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// URL shapes that carry a video ID, followed by the bare-ID form.
/// Tried in order; the first match wins.
static VIDEO_ID_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([a-zA-Z0-9_-]{11})")
            .expect("embedded video id pattern is valid"),
        Regex::new(r"^([a-zA-Z0-9_-]{11})$").expect("bare video id pattern is valid"),
    ]
});

/// The 11-character token YouTube assigns to a video.
///
/// Only [`extract_video_id`] creates these, so holding one means the token
/// already has the right length and alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch page URL for this video
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for VideoId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Extract a video ID from a YouTube URL or a bare ID.
///
/// Recognizes `youtube.com/watch?v=`, `youtu.be/` and `youtube.com/embed/` anywhere
/// in the input, then falls back to treating the whole input as an ID. The input is
/// not trimmed or case-folded. Returns `None` when nothing matches.
pub fn extract_video_id(input: &str) -> Option<VideoId> {
    VIDEO_ID_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(input)
            .and_then(|caps| caps.get(1))
            .map(|m| VideoId(m.as_str().to_string()))
    })
}
