//! Client side of the summarizer: turns an Enter keypress or a button click
//! into one `POST /summarize` call and renders the reply into a view.
//!
//! The summary comes back as an HTML fragment and is handed to the view as
//! markup, unescaped. The server is trusted not to send anything it should
//! not; views that cannot render markup decide for themselves how to show it.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::error::Result;

pub const EMPTY_INPUT_PROMPT: &str = "Please enter a YouTube URL";
pub const LOADING_MESSAGE: &str = "Loading summary...";
pub const CONNECTION_ERROR: &str = "Error: Could not connect to the server.";
pub const THUMBNAIL_ALT: &str = "Video Thumbnail";
pub const THUMBNAIL_CLASS: &str = "video-thumbnail";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailImage {
    pub src: String,
    pub alt: String,
    pub class: String,
}

impl ThumbnailImage {
    fn for_video(src: &str) -> Self {
        ThumbnailImage {
            src: src.to_string(),
            alt: THUMBNAIL_ALT.to_string(),
            class: THUMBNAIL_CLASS.to_string(),
        }
    }
}

/// The page regions the controller reads and writes.
pub trait SummaryView {
    /// Current raw contents of the URL input.
    fn input_value(&self) -> String;

    /// Replace the status area with plain text.
    fn set_status_text(&mut self, text: &str);

    /// Replace the status area with markup, rendered as-is.
    fn set_status_html(&mut self, html: &str);

    fn clear_thumbnails(&mut self);

    fn append_thumbnail(&mut self, image: ThumbnailImage);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    KeyDown(String),
    Click,
}

impl UiEvent {
    pub fn triggers_summary(&self) -> bool {
        match self {
            UiEvent::KeyDown(key) => key == "Enter",
            UiEvent::Click => true,
        }
    }
}

#[derive(Serialize)]
struct SummaryRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryReply {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    error: Value,
}

/// Message for a truthy `error` field. Strings are shown verbatim, other
/// JSON values as their JSON text; null, false, 0 and "" mean no error.
fn error_message(error: &Value) -> Option<String> {
    match error {
        Value::Null | Value::Bool(false) => None,
        Value::String(message) if message.is_empty() => None,
        Value::String(message) => Some(message.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// What a finished request turned into, ready to be drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    EmptyInput,
    ServerError(String),
    Summary {
        html: String,
        thumbnail_url: Option<String>,
    },
    ConnectionFailed,
}

impl SummaryOutcome {
    fn from_reply(reply: SummaryReply) -> Self {
        match error_message(&reply.error) {
            Some(message) => SummaryOutcome::ServerError(message),
            None => SummaryOutcome::Summary {
                html: reply.summary.unwrap_or_default(),
                thumbnail_url: reply.thumbnail_url.filter(|u| !u.is_empty()),
            },
        }
    }

    pub fn render<V: SummaryView + ?Sized>(&self, view: &mut V) {
        match self {
            SummaryOutcome::EmptyInput => {
                view.set_status_text(EMPTY_INPUT_PROMPT);
                view.clear_thumbnails();
            }
            SummaryOutcome::ServerError(message) => {
                view.set_status_text(&format!("Error: {}", message));
                view.clear_thumbnails();
            }
            SummaryOutcome::Summary { html, thumbnail_url } => {
                if let Some(src) = thumbnail_url {
                    view.append_thumbnail(ThumbnailImage::for_video(src));
                }
                view.set_status_html(html);
            }
            SummaryOutcome::ConnectionFailed => {
                view.set_status_text(CONNECTION_ERROR);
                view.clear_thumbnails();
            }
        }
    }
}

/// A request that passed validation and whose loading state is drawn.
#[derive(Debug, Clone)]
pub struct PendingSummary {
    url: String,
}

impl PendingSummary {
    pub fn url(&self) -> &str {
        &self.url
    }
}

pub struct SummaryController {
    client: Client,
    endpoint: Url,
}

impl SummaryController {
    /// `server` is the origin serving `/summarize`, e.g. `http://127.0.0.1:5000`.
    pub fn new(server: &str) -> Result<Self> {
        Self::with_client(Client::new(), server)
    }

    pub fn with_client(client: Client, server: &str) -> Result<Self> {
        let endpoint = Url::parse(server)?.join("/summarize")?;
        Ok(SummaryController { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Runs the flow when the event is Enter or a click. Other keys are ignored.
    pub async fn handle_event<V: SummaryView + ?Sized>(
        &self,
        event: &UiEvent,
        view: &mut V,
    ) -> Option<SummaryOutcome> {
        if !event.triggers_summary() {
            return None;
        }
        Some(self.fetch_summary(view).await)
    }

    pub async fn fetch_summary<V: SummaryView + ?Sized>(&self, view: &mut V) -> SummaryOutcome {
        let outcome = match self.begin(view) {
            Some(pending) => self.send(pending).await,
            None => SummaryOutcome::EmptyInput,
        };
        outcome.render(view);
        outcome
    }

    /// Synchronous half of the flow. Blank input draws the prompt and returns
    /// `None`; anything else draws the loading state and returns the request
    /// to send.
    pub fn begin<V: SummaryView + ?Sized>(&self, view: &mut V) -> Option<PendingSummary> {
        let url = view.input_value();
        if url.trim().is_empty() {
            SummaryOutcome::EmptyInput.render(view);
            return None;
        }

        debug!(%url, "fetching summary");
        view.set_status_text(LOADING_MESSAGE);
        view.clear_thumbnails();
        view.set_status_html("");
        Some(PendingSummary { url })
    }

    /// Sends the raw input, untrimmed. HTTP status is not inspected; any JSON
    /// body is taken at face value.
    pub async fn send(&self, pending: PendingSummary) -> SummaryOutcome {
        let reply = async {
            self.client
                .post(self.endpoint.clone())
                .json(&SummaryRequest { url: &pending.url })
                .send()
                .await?
                .json::<SummaryReply>()
                .await
        }
        .await;

        match reply {
            Ok(reply) => SummaryOutcome::from_reply(reply),
            Err(err) => {
                error!(endpoint = %self.endpoint, error = %err, "summary request failed");
                SummaryOutcome::ConnectionFailed
            }
        }
    }
}
