use async_trait::async_trait;
use serde::Serialize;

use crate::config::{Backend, Config};
use crate::extractors::VideoId;
use crate::TranscriptError;

pub mod innertube;
pub mod processor;
pub mod ytdlp;

/// One caption unit as delivered by a transcript source
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    /// Start offset in seconds
    pub start: f64,

    /// Duration in seconds
    pub duration: f64,

    pub text: String,
}

/// Raw transcript returned by a [`TranscriptSource`]
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedTranscript {
    pub video_id: VideoId,

    /// Language code of the selected track, if the source knows it
    pub language_code: Option<String>,

    /// Human readable language name, if the source knows it
    pub language: Option<String>,

    /// Whether the track was generated by speech recognition
    pub is_generated: bool,

    /// Entries in playback order
    pub entries: Vec<TranscriptEntry>,
}

/// Anything that can retrieve captions for a video.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Fail fast when the source cannot work at all (missing executable, etc).
    async fn check_availability(&self) -> Result<(), TranscriptError> {
        Ok(())
    }

    /// Fetch the transcript in the first available language of `languages`.
    async fn fetch(
        &self,
        video_id: &VideoId,
        languages: &[String],
    ) -> Result<FetchedTranscript, TranscriptError>;
}

/// Output segment: start offset and caption text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub text: String,
}

/// A successfully fetched and reshaped transcript
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub video_id: VideoId,
    pub language: Option<String>,

    /// All segment texts joined by single spaces, trimmed
    pub text: String,

    pub segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    pub video_id: Option<VideoId>,
    pub error: String,
}

/// Outcome of a transcript fetch. Never partial.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptResult {
    Success(Transcript),
    Failure(FetchFailure),
}

impl From<FetchedTranscript> for Transcript {
    fn from(fetched: FetchedTranscript) -> Self {
        let text = fetched
            .entries
            .iter()
            .map(|entry| entry.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();

        let segments = fetched
            .entries
            .into_iter()
            .map(|entry| TranscriptSegment {
                start: entry.start,
                text: entry.text,
            })
            .collect();

        Transcript {
            video_id: fetched.video_id,
            language: fetched.language_code,
            text,
            segments,
        }
    }
}

/// Fetch a transcript through `source` and reshape it.
///
/// Every source error, including an availability failure, becomes a
/// [`TranscriptResult::Failure`] carrying the error's message unchanged.
pub async fn get_transcript(
    source: &dyn TranscriptSource,
    video_id: &VideoId,
    languages: &[String],
) -> TranscriptResult {
    let fetched = match source.check_availability().await {
        Ok(()) => source.fetch(video_id, languages).await,
        Err(err) => Err(err),
    };

    match fetched {
        Ok(fetched) => {
            tracing::info!(
                source = source.name(),
                video_id = %video_id,
                language = fetched.language_code.as_deref().unwrap_or("unknown"),
                generated = fetched.is_generated,
                entries = fetched.entries.len(),
                "Transcript fetched"
            );
            TranscriptResult::Success(fetched.into())
        }
        Err(err) => {
            tracing::warn!(
                source = source.name(),
                video_id = %video_id,
                "Transcript fetch failed: {}",
                err
            );
            TranscriptResult::Failure(FetchFailure {
                video_id: Some(video_id.clone()),
                error: err.to_string(),
            })
        }
    }
}

/// Build the transcript source selected by `backend`
pub fn build_source(
    backend: Backend,
    config: &Config,
) -> Result<Box<dyn TranscriptSource>, TranscriptError> {
    match backend {
        Backend::Innertube => Ok(Box::new(innertube::InnertubeSource::new(config)?)),
        Backend::YtDlp => Ok(Box::new(ytdlp::YtDlpSource::new(config))),
    }
}
