use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::transcribe::{FetchFailure, Transcript, TranscriptResult};
use crate::InvocationError;

const UNKNOWN_LANGUAGE: &str = "unknown";

impl Serialize for Transcript {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("success", &true)?;
        map.serialize_entry("video_id", &self.video_id)?;
        map.serialize_entry("language", self.language.as_deref().unwrap_or(UNKNOWN_LANGUAGE))?;
        map.serialize_entry("transcript", &self.text)?;
        map.serialize_entry("segments", &self.segments)?;
        map.end()
    }
}

impl Serialize for FetchFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.video_id.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("success", &false)?;
        if let Some(video_id) = &self.video_id {
            map.serialize_entry("video_id", video_id)?;
        }
        map.serialize_entry("error", &self.error)?;
        map.end()
    }
}

impl Serialize for TranscriptResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TranscriptResult::Success(transcript) => transcript.serialize(serializer),
            TranscriptResult::Failure(failure) => failure.serialize(serializer),
        }
    }
}

impl From<InvocationError> for FetchFailure {
    fn from(err: InvocationError) -> Self {
        FetchFailure {
            video_id: None,
            error: err.to_string(),
        }
    }
}

/// Render a result as a JSON document. Non-ASCII text is written as-is.
pub fn format_as_json<T: Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

/// Render an invocation error as a failure document
pub fn format_invocation_error(err: InvocationError, pretty: bool) -> String {
    let failure = FetchFailure::from(err);
    format_as_json(&failure, pretty).unwrap_or_else(|_| {
        // Only string fields; serialization cannot fail in practice.
        format!(r#"{{"success":false,"error":{:?}}}"#, failure.error)
    })
}
