use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use super::TranscriptEntry;
use crate::TranscriptError;

static TEXT_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<text\b([^>]*?)(?:/>|>(.*?)</text>)"#).expect("text element pattern is valid")
});

static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("attribute pattern is valid"));

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?[a-z][^>]*>").expect("tag pattern is valid"));

/// Tags kept when formatting is preserved
const FORMATTING_TAGS: [&str; 10] = [
    "strong", "em", "b", "i", "mark", "small", "del", "ins", "sub", "sup",
];

/// Parse YouTube's timedtext XML into transcript entries.
///
/// Elements without text are skipped. Entities are decoded twice because the
/// caption text inside the XML is itself HTML-escaped.
pub fn parse_timedtext(
    xml: &str,
    preserve_formatting: bool,
) -> Result<Vec<TranscriptEntry>, TranscriptError> {
    let mut entries = Vec::new();

    for caps in TEXT_ELEMENT.captures_iter(xml) {
        let Some(body) = caps.get(2).map(|m| m.as_str()) else {
            continue;
        };
        if body.is_empty() {
            continue;
        }

        let attributes = &caps[1];
        let start = numeric_attribute(attributes, "start")?.unwrap_or(0.0);
        let duration = numeric_attribute(attributes, "dur")?.unwrap_or(0.0);

        let decoded = html_escape::decode_html_entities(body);
        let decoded = html_escape::decode_html_entities(&decoded);
        let text = strip_tags(&decoded, preserve_formatting);

        entries.push(TranscriptEntry { start, duration, text });
    }

    Ok(entries)
}

fn numeric_attribute(attributes: &str, name: &str) -> Result<Option<f64>, TranscriptError> {
    ATTRIBUTE
        .captures_iter(attributes)
        .find(|caps| &caps[1] == name)
        .map(|caps| {
            caps[2].parse::<f64>().map_err(|_| {
                TranscriptError::UnparsableResponse(format!(
                    "invalid {} value '{}' in timedtext",
                    name, &caps[2]
                ))
            })
        })
        .transpose()
}

fn strip_tags(text: &str, preserve_formatting: bool) -> String {
    ANY_TAG
        .replace_all(text, |caps: &regex::Captures| {
            let tag = &caps[0];
            if preserve_formatting && is_formatting_tag(tag) {
                tag.to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

fn is_formatting_tag(tag: &str) -> bool {
    let name: String = tag
        .trim_start_matches('<')
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    FORMATTING_TAGS.contains(&name.as_str())
}

/// yt-dlp / YouTube json3 caption file
#[derive(Debug, Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: u64,
    segs: Option<Vec<Json3Seg>>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Parse a json3 caption file into transcript entries.
///
/// Window-definition events (no `segs`) and events that are only whitespace are skipped.
pub fn parse_json3(json: &str) -> Result<Vec<TranscriptEntry>, TranscriptError> {
    let captions: Json3 = serde_json::from_str(json)?;

    let entries = captions
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs?.into_iter().map(|seg| seg.utf8).collect();
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            Some(TranscriptEntry {
                start: event.t_start_ms as f64 / 1000.0,
                duration: event.d_duration_ms as f64 / 1000.0,
                text: text.to_string(),
            })
        })
        .collect();

    Ok(entries)
}
