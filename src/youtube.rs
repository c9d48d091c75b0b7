use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::ACCEPT_LANGUAGE;
use reqwest::{Client, ClientBuilder, StatusCode};
use scraper::{Html, Selector};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};

// Shared client so watch-page and timedtext fetches reuse connections
static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(10)
        .build()
        .expect("Failed to build HTTP client")
});

static VIDEO_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?:v=|/)([0-9A-Za-z_-]{11})",
        r"(?:youtu\.be/)([0-9A-Za-z_-]{11})",
        r"(?:embed/)([0-9A-Za-z_-]{11})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Failed to compile video id pattern"))
    .collect()
});

static TEXT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("text").expect("Failed to parse text selector"));

/// Pulls the 11-character video ID out of the common URL shapes
/// (`watch?v=`, `youtu.be/`, `embed/`, `shorts/`).
pub fn extract_video_id(url: &str) -> Option<String> {
    let id = VIDEO_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    match &id {
        Some(id) => debug!(url, video_id = %id, "extracted video id"),
        None => debug!(url, "could not extract video id"),
    }
    id
}

pub fn thumbnail_url(video_id: &str) -> String {
    format!("http://img.youtube.com/vi/{}/0.jpg", video_id)
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("transcripts are disabled for this video")]
    Disabled,

    #[error("no English transcript is available")]
    NotFound,

    #[error("YouTube is rate limiting requests")]
    TooManyRequests,

    #[error("the video is unavailable")]
    VideoUnavailable,

    #[error("transcript document contained no text")]
    EmptyDocument,

    #[error("{0}")]
    Fetch(String),
}

impl TranscriptError {
    /// Failures worth another attempt after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TranscriptError::TooManyRequests
                | TranscriptError::VideoUnavailable
                | TranscriptError::EmptyDocument
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            TranscriptError::Disabled => {
                "This video has captions disabled. Please try a different video with captions enabled.".to_string()
            }
            TranscriptError::NotFound => {
                "No transcript found for this video. Please try a different video with captions enabled.".to_string()
            }
            TranscriptError::TooManyRequests | TranscriptError::VideoUnavailable => {
                "Could not retrieve transcript. This might be due to YouTube restrictions. Please try again later.".to_string()
            }
            TranscriptError::EmptyDocument => {
                "Error accessing video transcript. Please try a different video or try again later.".to_string()
            }
            TranscriptError::Fetch(detail) => format!("Error fetching transcript: {}", detail),
        }
    }
}

impl From<reqwest::Error> for TranscriptError {
    fn from(err: reqwest::Error) -> Self {
        TranscriptError::Fetch(err.to_string())
    }
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch_transcript(&self, video_id: &str) -> std::result::Result<String, TranscriptError>;
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        RetryPolicy {
            attempts: config.transcript_attempts.max(1),
            delay: config.transcript_retry_delay,
        }
    }
}

/// Fetches a transcript, retrying transient failures. The final failure is
/// turned into the message shown to the user.
pub async fn fetch_with_retry(
    source: &dyn TranscriptSource,
    video_id: &str,
    policy: RetryPolicy,
) -> Result<String> {
    let mut attempt = 1;
    loop {
        match source.fetch_transcript(video_id).await {
            Ok(transcript) => {
                info!(video_id, attempt, chars = transcript.len(), "transcript fetched");
                return Ok(transcript);
            }
            Err(err) if err.is_transient() && attempt < policy.attempts => {
                warn!(video_id, attempt, error = %err, "transcript fetch failed, retrying in {:?}", policy.delay);
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(video_id, attempt, error = %err, "transcript fetch failed");
                return Err(AppError::TranscriptError(err.user_message()));
            }
        }
    }
}

/// Scrapes caption tracks from the public watch page.
pub struct YoutubeTranscripts {
    base_url: String,
}

impl YoutubeTranscripts {
    pub fn new(base_url: impl Into<String>) -> Self {
        YoutubeTranscripts {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TranscriptSource for YoutubeTranscripts {
    async fn fetch_transcript(&self, video_id: &str) -> std::result::Result<String, TranscriptError> {
        let watch_url = format!("{}/watch?v={}", self.base_url, video_id);
        debug!(%watch_url, "fetching watch page");
        let html = fetch_text(CLIENT.get(&watch_url).header(ACCEPT_LANGUAGE, "en-US")).await?;

        let tracks = parse_caption_tracks(&html)?;
        let track = select_english_track(&tracks).ok_or(TranscriptError::NotFound)?;
        debug!(language = %track.language_code, generated = track.is_generated(), "selected caption track");

        let xml = fetch_text(CLIENT.get(track.base_url.replace("&fmt=srv3", ""))).await?;
        parse_transcript_xml(&xml)
    }
}

async fn fetch_text(request: reqwest::RequestBuilder) -> std::result::Result<String, TranscriptError> {
    let response = request.send().await?;
    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        return Err(TranscriptError::TooManyRequests);
    }
    Ok(response.error_for_status()?.text().await?)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    #[serde(default)]
    pub kind: Option<String>,
}

impl CaptionTrack {
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerCaptions {
    player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    caption_tracks: Option<Vec<CaptionTrack>>,
}

/// Reads the caption track list embedded in a watch page.
pub fn parse_caption_tracks(html: &str) -> std::result::Result<Vec<CaptionTrack>, TranscriptError> {
    let Some((_, after)) = html.split_once("\"captions\":") else {
        if html.contains("class=\"g-recaptcha\"") {
            return Err(TranscriptError::TooManyRequests);
        }
        if !html.contains("\"playabilityStatus\":") {
            return Err(TranscriptError::VideoUnavailable);
        }
        return Err(TranscriptError::Disabled);
    };

    let json = after
        .split(",\"videoDetails")
        .next()
        .unwrap_or_default()
        .replace('\n', "");
    let captions: PlayerCaptions = serde_json::from_str(&json)
        .map_err(|e| TranscriptError::Fetch(format!("malformed caption data: {}", e)))?;

    captions
        .player_captions_tracklist_renderer
        .and_then(|renderer| renderer.caption_tracks)
        .ok_or(TranscriptError::Disabled)
}

/// English track, manually created ones first.
pub fn select_english_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    let english = || tracks.iter().filter(|t| t.language_code == "en");
    english()
        .find(|t| !t.is_generated())
        .or_else(|| english().find(|t| t.is_generated()))
}

/// Joins the `<text>` segments of a timedtext document into one string.
pub fn parse_transcript_xml(xml: &str) -> std::result::Result<String, TranscriptError> {
    let document = Html::parse_fragment(xml);

    let segments: Vec<String> = document
        .select(&TEXT_SELECTOR)
        .map(|element| clean_segment(&element.text().collect::<String>()))
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.is_empty() {
        return Err(TranscriptError::EmptyDocument);
    }
    Ok(segments.join(" "))
}

// Segment bodies are escaped twice; a second parse decodes the inner layer
// and drops inline formatting tags.
fn clean_segment(raw: &str) -> String {
    let inner = Html::parse_fragment(raw);
    let text: String = inner.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn extracts_ids_from_common_url_shapes() {
        let cases = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ",
        ];
        for url in cases {
            assert_eq!(extract_video_id(url).as_deref(), Some("dQw4w9WgXcQ"), "{}", url);
        }
    }

    #[test]
    fn rejects_urls_without_an_id() {
        assert_eq!(extract_video_id("https://www.youtube.com/"), None);
        assert_eq!(extract_video_id("not a url"), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[test]
    fn thumbnail_points_at_the_default_frame() {
        assert_eq!(thumbnail_url("dQw4w9WgXcQ"), "http://img.youtube.com/vi/dQw4w9WgXcQ/0.jpg");
    }

    fn watch_page(captions: &str) -> String {
        format!(
            "<html><script>var ytInitialPlayerResponse = {{\"playabilityStatus\":{{\"status\":\"OK\"}},\"captions\":{},\"videoDetails\":{{\"videoId\":\"dQw4w9WgXcQ\"}}}};</script></html>",
            captions
        )
    }

    #[test]
    fn parses_caption_tracks_from_watch_page() {
        let html = watch_page(
            r#"{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://www.youtube.com/api/timedtext?v=x&lang=en","languageCode":"en","kind":"asr"},{"baseUrl":"https://www.youtube.com/api/timedtext?v=x&lang=de","languageCode":"de"}]}}"#,
        );
        let tracks = parse_caption_tracks(&html).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].base_url, "https://www.youtube.com/api/timedtext?v=x&lang=en");
        assert!(tracks[0].is_generated());
        assert!(!tracks[1].is_generated());
    }

    #[test]
    fn missing_caption_tracks_means_disabled() {
        let html = watch_page(r#"{"playerCaptionsTracklistRenderer":{"audioTracks":[]}}"#);
        assert!(matches!(parse_caption_tracks(&html), Err(TranscriptError::Disabled)));

        let no_captions = "<html>\"playabilityStatus\":{\"status\":\"OK\"}</html>";
        assert!(matches!(parse_caption_tracks(no_captions), Err(TranscriptError::Disabled)));
    }

    #[test]
    fn recaptcha_and_missing_player_are_transient() {
        let captcha = "<form><div class=\"g-recaptcha\"></div></form>";
        let err = parse_caption_tracks(captcha).unwrap_err();
        assert!(matches!(err, TranscriptError::TooManyRequests));
        assert!(err.is_transient());

        let err = parse_caption_tracks("<html></html>").unwrap_err();
        assert!(matches!(err, TranscriptError::VideoUnavailable));
        assert!(err.is_transient());
    }

    fn track(language: &str, kind: Option<&str>, url: &str) -> CaptionTrack {
        CaptionTrack {
            base_url: url.to_string(),
            language_code: language.to_string(),
            kind: kind.map(str::to_string),
        }
    }

    #[test]
    fn manual_english_track_beats_generated() {
        let tracks = vec![
            track("en", Some("asr"), "generated"),
            track("fr", None, "french"),
            track("en", None, "manual"),
        ];
        assert_eq!(select_english_track(&tracks).unwrap().base_url, "manual");

        let generated_only = vec![track("en", Some("asr"), "generated")];
        assert_eq!(select_english_track(&generated_only).unwrap().base_url, "generated");

        let no_english = vec![track("fr", None, "french")];
        assert!(select_english_track(&no_english).is_none());
    }

    #[test]
    fn transcript_xml_is_joined_and_unescaped() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="0" dur="1.5">Hello &amp;amp; welcome</text><text start="1.5" dur="2">it&amp;#39;s
a &lt;i&gt;test&lt;/i&gt;</text><text start="3.5" dur="1"></text></transcript>"#;
        assert_eq!(parse_transcript_xml(xml).unwrap(), "Hello & welcome it's a test");
    }

    #[test]
    fn empty_transcript_document_is_transient() {
        let err = parse_transcript_xml("").unwrap_err();
        assert!(matches!(err, TranscriptError::EmptyDocument));
        assert!(err.is_transient());
    }

    struct ScriptedSource {
        replies: Mutex<Vec<std::result::Result<String, TranscriptError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedSource {
        fn new(mut replies: Vec<std::result::Result<String, TranscriptError>>) -> Self {
            replies.reverse();
            ScriptedSource {
                replies: Mutex::new(replies),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl TranscriptSource for ScriptedSource {
        async fn fetch_transcript(&self, _video_id: &str) -> std::result::Result<String, TranscriptError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(TranscriptError::EmptyDocument))
        }
    }

    fn quick_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let source = ScriptedSource::new(vec![
            Err(TranscriptError::TooManyRequests),
            Err(TranscriptError::EmptyDocument),
            Ok("the transcript".to_string()),
        ]);
        let transcript = fetch_with_retry(&source, "dQw4w9WgXcQ", quick_policy(3)).await.unwrap();
        assert_eq!(transcript, "the transcript");
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let source = ScriptedSource::new(vec![Err(TranscriptError::Disabled)]);
        let err = fetch_with_retry(&source, "dQw4w9WgXcQ", quick_policy(3)).await.unwrap_err();
        assert_eq!(source.calls(), 1);
        assert_eq!(
            err.to_string(),
            "This video has captions disabled. Please try a different video with captions enabled."
        );
    }

    #[tokio::test]
    async fn retries_stop_after_the_last_attempt() {
        let source = ScriptedSource::new(vec![
            Err(TranscriptError::VideoUnavailable),
            Err(TranscriptError::VideoUnavailable),
            Err(TranscriptError::VideoUnavailable),
            Ok("too late".to_string()),
        ]);
        let err = fetch_with_retry(&source, "dQw4w9WgXcQ", quick_policy(3)).await.unwrap_err();
        assert_eq!(source.calls(), 3);
        assert_eq!(
            err.to_string(),
            "Could not retrieve transcript. This might be due to YouTube restrictions. Please try again later."
        );
    }

    #[tokio::test]
    async fn fetch_errors_carry_their_detail() {
        let source = ScriptedSource::new(vec![Err(TranscriptError::Fetch("connection reset".to_string()))]);
        let err = fetch_with_retry(&source, "dQw4w9WgXcQ", quick_policy(3)).await.unwrap_err();
        assert_eq!(err.to_string(), "Error fetching transcript: connection reset");
    }

    #[tokio::test]
    async fn scrapes_transcript_from_a_watch_page_server() {
        use axum::{Router, extract::State, routing::get};

        async fn watch(State(base): State<String>) -> String {
            watch_page(&format!(
                r#"{{"playerCaptionsTracklistRenderer":{{"captionTracks":[{{"baseUrl":"{}/api/timedtext?v=dQw4w9WgXcQ&fmt=srv3","languageCode":"en"}}]}}}}"#,
                base
            ))
        }

        async fn timedtext(uri: axum::http::Uri) -> String {
            assert!(!uri.to_string().contains("fmt=srv3"));
            r#"<transcript><text start="0" dur="1">never gonna</text><text start="1" dur="1">give you up</text></transcript>"#.to_string()
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new()
            .route("/watch", get(watch))
            .route("/api/timedtext", get(timedtext))
            .with_state(base.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let source = YoutubeTranscripts::new(base);
        let transcript = source.fetch_transcript("dQw4w9WgXcQ").await.unwrap();
        assert_eq!(transcript, "never gonna give you up");
    }

    #[derive(Clone)]
    struct ThrottledYoutube {
        base: String,
        watch_hits: Arc<AtomicUsize>,
        timedtext_hits: Arc<AtomicUsize>,
    }

    /// Answers 429 to the first watch-page and first timedtext request.
    async fn spawn_throttled_youtube() -> ThrottledYoutube {
        use axum::{
            Router,
            extract::State,
            http::StatusCode as HttpStatus,
            response::{IntoResponse, Response},
            routing::get,
        };

        async fn watch(State(yt): State<ThrottledYoutube>) -> Response {
            if yt.watch_hits.fetch_add(1, Ordering::SeqCst) == 0 {
                return (HttpStatus::TOO_MANY_REQUESTS, "slow down").into_response();
            }
            watch_page(&format!(
                r#"{{"playerCaptionsTracklistRenderer":{{"captionTracks":[{{"baseUrl":"{}/api/timedtext?v=dQw4w9WgXcQ","languageCode":"en"}}]}}}}"#,
                yt.base
            ))
            .into_response()
        }

        async fn timedtext(State(yt): State<ThrottledYoutube>) -> Response {
            if yt.timedtext_hits.fetch_add(1, Ordering::SeqCst) == 0 {
                return (HttpStatus::TOO_MANY_REQUESTS, "slow down").into_response();
            }
            r#"<transcript><text start="0" dur="1">third time lucky</text></transcript>"#.into_response()
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let yt = ThrottledYoutube {
            base: format!("http://{}", listener.local_addr().unwrap()),
            watch_hits: Arc::new(AtomicUsize::new(0)),
            timedtext_hits: Arc::new(AtomicUsize::new(0)),
        };
        let app = Router::new()
            .route("/watch", get(watch))
            .route("/api/timedtext", get(timedtext))
            .with_state(yt.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        yt
    }

    #[tokio::test]
    async fn http_429_is_too_many_requests() {
        let yt = spawn_throttled_youtube().await;
        let source = YoutubeTranscripts::new(yt.base.clone());

        let err = source.fetch_transcript("dQw4w9WgXcQ").await.unwrap_err();
        assert!(matches!(err, TranscriptError::TooManyRequests));

        // Watch page is through; the timedtext request is throttled next.
        let err = source.fetch_transcript("dQw4w9WgXcQ").await.unwrap_err();
        assert!(matches!(err, TranscriptError::TooManyRequests));
        assert_eq!(yt.timedtext_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn throttled_fetches_are_retried() {
        let yt = spawn_throttled_youtube().await;
        let source = YoutubeTranscripts::new(yt.base.clone());

        let transcript = fetch_with_retry(&source, "dQw4w9WgXcQ", quick_policy(3)).await.unwrap();

        assert_eq!(transcript, "third time lucky");
        assert_eq!(yt.watch_hits.load(Ordering::SeqCst), 3);
        assert_eq!(yt.timedtext_hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn throttling_past_the_last_attempt_is_reported() {
        let yt = spawn_throttled_youtube().await;
        let source = YoutubeTranscripts::new(yt.base.clone());

        let err = fetch_with_retry(&source, "dQw4w9WgXcQ", quick_policy(1)).await.unwrap_err();

        assert_eq!(yt.watch_hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            err.to_string(),
            "Could not retrieve transcript. This might be due to YouTube restrictions. Please try again later."
        );
    }
}
