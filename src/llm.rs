use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, Result};

pub const SYSTEM_PROMPT: &str = "You are a helpful summarizer.";

const PROMPT_TEMPLATE: &str = "You are a YouTube video summarizer. Summarize the following transcript into clear bullet points, within 250 words:\n\n";

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

pub fn build_prompt(transcript: &str) -> String {
    let mut result = String::with_capacity(PROMPT_TEMPLATE.len() + transcript.len());
    result.push_str(PROMPT_TEMPLATE);
    result.push_str(transcript);
    result
}

/// Anything that can turn a transcript into a markdown summary.
#[async_trait]
pub trait SummaryModel: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<String>;
}

/// Groq's OpenAI-compatible chat completion endpoint.
pub struct GroqClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl GroqClient {
    pub fn from_config(config: &Config) -> Self {
        GroqClient {
            client: Client::new(),
            api_key: config.groq_api_key.clone(),
            endpoint: config.groq_api_url.clone(),
            model: config.groq_model.clone(),
            temperature: 0.5,
            max_tokens: 1024,
        }
    }

    async fn chat(&self, prompt: String) -> Result<String> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                Message {
                    role: "user".into(),
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| AppError::LlmError(e.to_string()))?;

        let json: serde_json::Value = res
            .json()
            .await
            .map_err(|e| AppError::LlmError(e.to_string()))?;
        let reply = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AppError::LlmError("Invalid response format from LLM".to_string()))?
            .to_string();

        Ok(reply)
    }
}

#[async_trait]
impl SummaryModel for GroqClient {
    async fn summarize(&self, transcript: &str) -> Result<String> {
        let prompt = build_prompt(transcript);
        debug!(model = %self.model, prompt_chars = prompt.len(), "calling chat completion");

        let reply = self.chat(prompt).await?;
        info!(model = %self.model, reply_chars = reply.len(), "summary generated");
        Ok(reply)
    }
}
