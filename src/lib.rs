pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod llm;
pub mod markdown;
pub mod telemetry;
pub mod youtube;

use std::sync::Arc;

use config::Config;
use llm::{GroqClient, SummaryModel};
use youtube::{TranscriptSource, YoutubeTranscripts};

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub transcripts: Arc<dyn TranscriptSource>,
    pub summarizer: Arc<dyn SummaryModel>,
}

impl AppState {
    /// Wires the live YouTube and Groq backends.
    pub fn from_config(config: Config) -> Self {
        let transcripts = Arc::new(YoutubeTranscripts::new(config.youtube_base_url.clone()));
        let summarizer = Arc::new(GroqClient::from_config(&config));
        AppState {
            config: Arc::new(config),
            transcripts,
            summarizer,
        }
    }
}
