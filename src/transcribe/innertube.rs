use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, COOKIE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

use super::{processor, FetchedTranscript, TranscriptEntry, TranscriptSource};
use crate::config::Config;
use crate::extractors::VideoId;
use crate::TranscriptError;

const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

const CONSENT_FORM_MARKER: &str = r#"action="https://consent.youtube.com/s""#;
const RECAPTCHA_MARKER: &str = r#"class="g-recaptcha""#;

const CLIENT_NAME: &str = "ANDROID";
const CLIENT_VERSION: &str = "20.10.38";

const BOT_CHECK_REASON: &str = "Sign in to confirm you’re not a bot";
const AGE_RESTRICTED_REASON: &str = "This video may be inappropriate for some users.";
const VIDEO_UNAVAILABLE_REASON: &str = "This video is unavailable";

static API_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""INNERTUBE_API_KEY":\s*"([a-zA-Z0-9_-]+)""#).expect("api key pattern is valid")
});

static CONSENT_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="v" value="(.*?)""#).expect("consent pattern is valid"));

/// Transcript source talking to YouTube's innertube API directly
pub struct InnertubeSource {
    client: reqwest::Client,
    base_url: String,
    preserve_formatting: bool,
}

/// A caption track advertised by the player response
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrack {
    pub base_url: String,
    pub language: String,
    pub language_code: String,
    pub is_generated: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    captions: Option<Captions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayabilityStatus {
    status: Option<String>,
    reason: Option<String>,
    error_screen: Option<ErrorScreen>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorScreen {
    player_error_message_renderer: Option<PlayerErrorMessageRenderer>,
}

#[derive(Debug, Deserialize)]
struct PlayerErrorMessageRenderer {
    subreason: Option<Text>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Text {
    simple_text: Option<String>,
    #[serde(default)]
    runs: Vec<TextRun>,
}

#[derive(Debug, Deserialize)]
struct TextRun {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Captions {
    player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    caption_tracks: Option<Vec<RawCaptionTrack>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCaptionTrack {
    base_url: String,
    name: Option<Text>,
    language_code: String,
    kind: Option<String>,
}

impl Text {
    fn flatten(&self) -> String {
        match &self.simple_text {
            Some(text) => text.clone(),
            None => self.runs.iter().map(|run| run.text.as_str()).collect(),
        }
    }
}

impl InnertubeSource {
    pub fn new(config: &Config) -> Result<Self, TranscriptError> {
        Self::with_base_url(config, DEFAULT_BASE_URL)
    }

    /// Point the source at another host; used to run against a local fake
    pub fn with_base_url(
        config: &Config,
        base_url: impl Into<String>,
    ) -> Result<Self, TranscriptError> {
        let mut headers = HeaderMap::new();
        let accept_language = HeaderValue::from_str(&config.http.accept_language).map_err(|_| {
            TranscriptError::CollaboratorUnavailable(format!(
                "invalid accept_language header value: {}",
                config.http.accept_language
            ))
        })?;
        headers.insert(ACCEPT_LANGUAGE, accept_language);

        let mut builder = reqwest::Client::builder()
            .user_agent(config.http.user_agent.clone())
            .default_headers(headers);

        if let Some(secs) = config.http.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            preserve_formatting: config.preserve_formatting,
        })
    }

    /// Fetch the watch page, accepting the cookie consent form once if YouTube shows it
    async fn fetch_video_html(&self, video_id: &VideoId) -> Result<String, TranscriptError> {
        let html = self.fetch_html(video_id, None).await?;
        if !html.contains(CONSENT_FORM_MARKER) {
            return Ok(html);
        }

        tracing::debug!(video_id = %video_id, "Consent form detected, retrying with cookie");
        let consent = consent_value(&html)
            .ok_or_else(|| TranscriptError::FailedToCreateConsentCookie(video_id.clone()))?;

        let html = self.fetch_html(video_id, Some(&consent)).await?;
        if html.contains(CONSENT_FORM_MARKER) {
            return Err(TranscriptError::FailedToCreateConsentCookie(video_id.clone()));
        }
        Ok(html)
    }

    async fn fetch_html(
        &self,
        video_id: &VideoId,
        consent: Option<&str>,
    ) -> Result<String, TranscriptError> {
        let url = format!("{}/watch", self.base_url);
        tracing::debug!("Fetching watch page for: {}", video_id);

        let mut request = self.client.get(&url).query(&[("v", video_id.as_str())]);
        if let Some(consent) = consent {
            request = request.header(COOKIE, format!("CONSENT=YES+{}", consent));
        }

        let response = request.send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(TranscriptError::RequestBlocked(video_id.clone()));
        }

        let body = response.error_for_status()?.text().await?;
        Ok(html_escape::decode_html_entities(&body).into_owned())
    }

    async fn fetch_player(
        &self,
        video_id: &VideoId,
        api_key: &str,
    ) -> Result<PlayerResponse, TranscriptError> {
        let url = format!("{}/youtubei/v1/player", self.base_url);
        let body = json!({
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                }
            },
            "videoId": video_id.as_str(),
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(TranscriptError::RequestBlocked(video_id.clone()));
        }

        let player = response.error_for_status()?.json::<PlayerResponse>().await?;
        Ok(player)
    }

    async fn fetch_track(
        &self,
        video_id: &VideoId,
        track: &CaptionTrack,
    ) -> Result<Vec<TranscriptEntry>, TranscriptError> {
        let url = timedtext_url(video_id, &track.base_url)?;
        tracing::debug!(language = %track.language_code, "Downloading caption track");

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(TranscriptError::RequestBlocked(video_id.clone()));
        }

        let xml = response.error_for_status()?.text().await?;
        processor::parse_timedtext(&xml, self.preserve_formatting)
    }
}

#[async_trait]
impl TranscriptSource for InnertubeSource {
    fn name(&self) -> &'static str {
        "innertube"
    }

    async fn fetch(
        &self,
        video_id: &VideoId,
        languages: &[String],
    ) -> Result<FetchedTranscript, TranscriptError> {
        let html = self.fetch_video_html(video_id).await?;
        let api_key = extract_api_key(video_id, &html)?;

        let player = self.fetch_player(video_id, &api_key).await?;
        let tracks = caption_tracks(video_id, player)?;

        let track =
            select_track(&tracks, languages).ok_or_else(|| TranscriptError::NoTranscriptFound {
                video_id: video_id.clone(),
                requested: languages.to_vec(),
                available: tracks.iter().map(describe_track).collect(),
            })?;

        let entries = self.fetch_track(video_id, track).await?;

        Ok(FetchedTranscript {
            video_id: video_id.clone(),
            language_code: Some(track.language_code.clone()),
            language: Some(track.language.clone()),
            is_generated: track.is_generated,
            entries,
        })
    }
}

fn consent_value(html: &str) -> Option<String> {
    CONSENT_VALUE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_api_key(video_id: &VideoId, html: &str) -> Result<String, TranscriptError> {
    if let Some(key) = API_KEY.captures(html).and_then(|caps| caps.get(1)) {
        return Ok(key.as_str().to_string());
    }

    if html.contains(RECAPTCHA_MARKER) {
        return Err(TranscriptError::RequestBlocked(video_id.clone()));
    }

    Err(TranscriptError::UnparsableResponse(format!(
        "innertube API key not found on the watch page of {}",
        video_id
    )))
}

/// Check playability and pull the caption tracks out of a player response
fn caption_tracks(
    video_id: &VideoId,
    player: PlayerResponse,
) -> Result<Vec<CaptionTrack>, TranscriptError> {
    if let Some(status) = player.playability_status {
        let state = status.status.as_deref().unwrap_or_default();
        if state != "OK" {
            let reason = status.reason.unwrap_or_default();

            match (state, reason.as_str()) {
                ("LOGIN_REQUIRED", BOT_CHECK_REASON) => {
                    return Err(TranscriptError::RequestBlocked(video_id.clone()))
                }
                ("LOGIN_REQUIRED", AGE_RESTRICTED_REASON) => {
                    return Err(TranscriptError::AgeRestricted(video_id.clone()))
                }
                ("ERROR", VIDEO_UNAVAILABLE_REASON) => {
                    return Err(TranscriptError::VideoUnavailable(video_id.clone()))
                }
                _ => {}
            }

            let subreasons = status
                .error_screen
                .and_then(|screen| screen.player_error_message_renderer)
                .and_then(|renderer| renderer.subreason)
                .map(|subreason| subreason.runs.into_iter().map(|run| run.text).collect())
                .unwrap_or_default();

            return Err(TranscriptError::VideoUnplayable {
                video_id: video_id.clone(),
                reason,
                subreasons,
            });
        }
    }

    let raw_tracks = player
        .captions
        .and_then(|captions| captions.player_captions_tracklist_renderer)
        .and_then(|renderer| renderer.caption_tracks)
        .ok_or_else(|| TranscriptError::TranscriptsDisabled(video_id.clone()))?;

    Ok(raw_tracks
        .into_iter()
        .map(|raw| CaptionTrack {
            language: raw.name.map(|name| name.flatten()).unwrap_or_default(),
            is_generated: raw.kind.as_deref() == Some("asr"),
            base_url: raw.base_url,
            language_code: raw.language_code,
        })
        .collect())
}

/// Pick a track by language preference; within one language a manually
/// created track beats an auto-generated one.
pub fn select_track<'a>(
    tracks: &'a [CaptionTrack],
    languages: &[String],
) -> Option<&'a CaptionTrack> {
    languages.iter().find_map(|language| {
        let mut candidates = tracks.iter().filter(|track| &track.language_code == language);
        let first = candidates.next()?;
        Some(
            std::iter::once(first)
                .chain(candidates)
                .find(|track| !track.is_generated)
                .unwrap_or(first),
        )
    })
}

fn describe_track(track: &CaptionTrack) -> String {
    let kind = if track.is_generated { "generated" } else { "manual" };
    format!("{} ({})", track.language_code, kind)
}

/// Caption URL without the `fmt` parameter, so YouTube answers with timedtext XML
fn timedtext_url(video_id: &VideoId, base_url: &str) -> Result<Url, TranscriptError> {
    let mut url = Url::parse(base_url).map_err(|err| {
        TranscriptError::UnparsableResponse(format!("invalid caption URL {}: {}", base_url, err))
    })?;

    if url.query_pairs().any(|(key, value)| key == "exp" && value == "xpe") {
        return Err(TranscriptError::PoTokenRequired(video_id.clone()));
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "fmt")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut().clear().extend_pairs(kept);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::extract_video_id;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VIDEO_ID: &str = "dQw4w9WgXcQ";

    const CONSENT_PAGE: &str =
        r#"<form action="https://consent.youtube.com/s"><input name="v" value="cb.1"></form>"#;

    fn video_id() -> VideoId {
        extract_video_id(VIDEO_ID).unwrap()
    }

    fn languages(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|s| s.to_string()).collect()
    }

    fn track(code: &str, generated: bool) -> CaptionTrack {
        CaptionTrack {
            base_url: format!("https://www.youtube.com/api/timedtext?lang={}", code),
            language: code.to_uppercase(),
            language_code: code.to_string(),
            is_generated: generated,
        }
    }

    fn watch_page() -> String {
        r#"<script>ytcfg.set({"INNERTUBE_API_KEY": "test_api-KEY1"});</script>"#.to_string()
    }

    async fn mount_watch_page(server: &MockServer, body: String) {
        Mock::given(method("GET"))
            .and(path("/watch"))
            .and(query_param("v", VIDEO_ID))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn mount_player(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/youtubei/v1/player"))
            .and(query_param("key", "test_api-KEY1"))
            .and(body_partial_json(json!({"videoId": VIDEO_ID})))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn source(server: &MockServer) -> InnertubeSource {
        InnertubeSource::with_base_url(&Config::default(), server.uri()).unwrap()
    }

    #[test]
    fn test_select_track_follows_language_order() {
        let tracks = vec![track("de", false), track("en", true), track("fr", false)];
        let selected = select_track(&tracks, &languages(&["es", "en", "de"])).unwrap();
        assert_eq!(selected.language_code, "en");
    }

    #[test]
    fn test_select_track_prefers_manual_within_language() {
        let tracks = vec![track("en", true), track("en", false)];
        let selected = select_track(&tracks, &languages(&["en"])).unwrap();
        assert!(!selected.is_generated);
    }

    #[test]
    fn test_select_track_none_when_no_language_matches() {
        let tracks = vec![track("ja", false)];
        assert!(select_track(&tracks, &languages(&["en", "es"])).is_none());
    }

    #[test]
    fn test_timedtext_url_drops_fmt() {
        let base_url = "https://www.youtube.com/api/timedtext?v=x&fmt=srv3&lang=en";
        let url = timedtext_url(&video_id(), base_url).unwrap();
        assert_eq!(url.as_str(), "https://www.youtube.com/api/timedtext?v=x&lang=en");
    }

    #[test]
    fn test_timedtext_url_po_token() {
        let base_url = "https://www.youtube.com/api/timedtext?v=x&exp=xpe";
        let err = timedtext_url(&video_id(), base_url).unwrap_err();
        assert!(matches!(err, TranscriptError::PoTokenRequired(_)));
    }

    #[test]
    fn test_extract_api_key() {
        assert_eq!(extract_api_key(&video_id(), &watch_page()).unwrap(), "test_api-KEY1");
        assert!(matches!(
            extract_api_key(&video_id(), r#"<div class="g-recaptcha"></div>"#),
            Err(TranscriptError::RequestBlocked(_))
        ));
        assert!(matches!(
            extract_api_key(&video_id(), "<html></html>"),
            Err(TranscriptError::UnparsableResponse(_))
        ));
    }

    #[test]
    fn test_consent_value() {
        let html = concat!(
            r#"<form action="https://consent.youtube.com/s">"#,
            r#"<input type="hidden" name="v" value="cb.20210328-17-p0.en+FX+123"></form>"#
        );
        assert_eq!(consent_value(html).as_deref(), Some("cb.20210328-17-p0.en+FX+123"));
    }

    #[test]
    fn test_playability_errors() {
        let player: PlayerResponse = serde_json::from_value(json!({
            "playabilityStatus": {"status": "ERROR", "reason": "This video is unavailable"}
        }))
        .unwrap();
        assert!(matches!(
            caption_tracks(&video_id(), player),
            Err(TranscriptError::VideoUnavailable(_))
        ));

        let player: PlayerResponse = serde_json::from_value(json!({
            "playabilityStatus": {"status": "LOGIN_REQUIRED", "reason": AGE_RESTRICTED_REASON}
        }))
        .unwrap();
        assert!(matches!(
            caption_tracks(&video_id(), player),
            Err(TranscriptError::AgeRestricted(_))
        ));

        let player: PlayerResponse = serde_json::from_value(json!({
            "playabilityStatus": {
                "status": "UNPLAYABLE",
                "reason": "Video unavailable",
                "errorScreen": {"playerErrorMessageRenderer": {
                    "subreason": {"runs": [{"text": "This video is private."}]}
                }}
            }
        }))
        .unwrap();
        match caption_tracks(&video_id(), player) {
            Err(TranscriptError::VideoUnplayable { reason, subreasons, .. }) => {
                assert_eq!(reason, "Video unavailable");
                assert_eq!(subreasons, vec!["This video is private."]);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let player: PlayerResponse = serde_json::from_value(json!({
            "playabilityStatus": {"status": "LOGIN_REQUIRED", "reason": BOT_CHECK_REASON}
        }))
        .unwrap();
        assert!(matches!(
            caption_tracks(&video_id(), player),
            Err(TranscriptError::RequestBlocked(_))
        ));
    }

    #[test]
    fn test_missing_captions_means_disabled() {
        let player: PlayerResponse = serde_json::from_value(json!({
            "playabilityStatus": {"status": "OK"},
            "captions": {}
        }))
        .unwrap();
        assert!(matches!(
            caption_tracks(&video_id(), player),
            Err(TranscriptError::TranscriptsDisabled(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_end_to_end() {
        let server = MockServer::start().await;
        mount_watch_page(&server, watch_page()).await;
        mount_player(
            &server,
            json!({
                "playabilityStatus": {"status": "OK"},
                "captions": {"playerCaptionsTracklistRenderer": {"captionTracks": [
                    {
                        "baseUrl": format!(
                            "{}/api/timedtext?v={}&lang=en&kind=asr&fmt=srv3",
                            server.uri(),
                            VIDEO_ID
                        ),
                        "name": {"runs": [{"text": "English (auto-generated)"}]},
                        "languageCode": "en",
                        "kind": "asr"
                    },
                    {
                        "baseUrl": format!("{}/api/timedtext?v={}&lang=de", server.uri(), VIDEO_ID),
                        "name": {"simpleText": "Deutsch"},
                        "languageCode": "de"
                    }
                ]}}
            }),
        )
        .await;

        Mock::given(method("GET"))
            .and(path("/api/timedtext"))
            .and(query_param("lang", "en"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                concat!(
                    r#"<transcript><text start="0.0" dur="1.5">Hello</text>"#,
                    r#"<text start="1.5" dur="2.0">world &amp;amp; more</text></transcript>"#
                ),
            ))
            .mount(&server)
            .await;

        let fetched = source(&server)
            .fetch(&video_id(), &languages(&["en", "de"]))
            .await
            .unwrap();

        assert_eq!(fetched.language_code.as_deref(), Some("en"));
        assert_eq!(fetched.language.as_deref(), Some("English (auto-generated)"));
        assert!(fetched.is_generated);
        assert_eq!(fetched.entries.len(), 2);
        assert_eq!(fetched.entries[0].text, "Hello");
        assert_eq!(fetched.entries[1].start, 1.5);
        assert_eq!(fetched.entries[1].text, "world & more");
    }

    #[tokio::test]
    async fn test_fetch_reports_available_languages() {
        let server = MockServer::start().await;
        mount_watch_page(&server, watch_page()).await;
        mount_player(
            &server,
            json!({
                "playabilityStatus": {"status": "OK"},
                "captions": {"playerCaptionsTracklistRenderer": {"captionTracks": [
                    {
                        "baseUrl": format!("{}/api/timedtext?lang=ja", server.uri()),
                        "languageCode": "ja"
                    }
                ]}}
            }),
        )
        .await;

        let err = source(&server)
            .fetch(&video_id(), &languages(&["en", "es"]))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            concat!(
                "No transcripts were found for any of the requested language codes [en, es] ",
                "for the video dQw4w9WgXcQ. Available: [ja (manual)]"
            )
        );
    }

    #[tokio::test]
    async fn test_fetch_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/watch"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = source(&server)
            .fetch(&video_id(), &languages(&["en"]))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscriptError::RequestBlocked(_)));
    }

    #[tokio::test]
    async fn test_consent_form_that_never_clears() {
        let server = MockServer::start().await;
        mount_watch_page(&server, CONSENT_PAGE.to_string()).await;

        let err = source(&server)
            .fetch(&video_id(), &languages(&["en"]))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscriptError::FailedToCreateConsentCookie(_)));
    }

    #[tokio::test]
    async fn test_consent_cookie_retry_reaches_player() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/watch"))
            .and(query_param("v", VIDEO_ID))
            .and(header("cookie", "CONSENT=YES+cb.1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(watch_page()))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_watch_page(&server, CONSENT_PAGE.to_string()).await;
        mount_player(&server, json!({"playabilityStatus": {"status": "OK"}})).await;

        let err = source(&server)
            .fetch(&video_id(), &languages(&["en"]))
            .await
            .unwrap_err();

        // Only the player endpoint can report missing captions
        assert!(matches!(err, TranscriptError::TranscriptsDisabled(_)));
    }
}
