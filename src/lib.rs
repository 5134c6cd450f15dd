//! yt-transcript - A Rust CLI tool for extracting YouTube video transcripts
//!
//! This library turns a YouTube URL or video ID into a JSON document holding the
//! full transcript text and its timestamped segments. Caption retrieval is delegated
//! to a [`TranscriptSource`]: either YouTube's innertube API over HTTP or `yt-dlp`.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod transcribe;
pub mod utils;

pub use cli::{run, Cli, Outcome};
pub use config::{Backend, Config};
pub use extractors::{extract_video_id, VideoId};
pub use transcribe::{
    get_transcript, FetchFailure, FetchedTranscript, Transcript, TranscriptEntry,
    TranscriptResult, TranscriptSegment, TranscriptSource,
};

/// Failures reported by a transcript source.
///
/// The `Display` text of each variant is what ends up in the `error` field of the
/// JSON output, so messages are written for the person reading that document.
#[derive(thiserror::Error, Debug)]
pub enum TranscriptError {
    #[error("Transcript source unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("The video {0} is no longer available")]
    VideoUnavailable(VideoId),

    #[error("The video {video_id} is unplayable: {reason}{}", format_subreasons(.subreasons))]
    VideoUnplayable {
        video_id: VideoId,
        reason: String,
        subreasons: Vec<String>,
    },

    #[error("The video {0} is age restricted and cannot be accessed without signing in")]
    AgeRestricted(VideoId),

    #[error("Subtitles are disabled for the video {0}")]
    TranscriptsDisabled(VideoId),

    #[error(
        "No transcripts were found for any of the requested language codes [{}] for the video {video_id}. Available: [{}]",
        .requested.join(", "),
        .available.join(", ")
    )]
    NoTranscriptFound {
        video_id: VideoId,
        requested: Vec<String>,
        available: Vec<String>,
    },

    #[error("YouTube is blocking requests from this IP address for the video {0}")]
    RequestBlocked(VideoId),

    #[error("The requested transcript for the video {0} requires a PO token")]
    PoTokenRequired(VideoId),

    #[error("Failed to automatically give consent to saving cookies for the video {0}")]
    FailedToCreateConsentCookie(VideoId),

    #[error("YouTube returned data that could not be parsed: {0}")]
    UnparsableResponse(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Free-form failure text from a collaborator, passed through unchanged.
    #[error("{0}")]
    Collaborator(String),
}

fn format_subreasons(subreasons: &[String]) -> String {
    if subreasons.is_empty() {
        String::new()
    } else {
        format!(" ({})", subreasons.join(" "))
    }
}

/// Invocation problems detected before any network activity.
#[derive(thiserror::Error, Debug)]
pub enum InvocationError {
    #[error("Usage: {0} <youtube-url-or-id>")]
    Usage(String),

    #[error("{0}")]
    Arguments(String),

    #[error("Could not extract video ID from: {0}")]
    UnparseableInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
