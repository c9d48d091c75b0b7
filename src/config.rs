use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const DEFAULT_GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_GROQ_MODEL: &str = "llama3-8b-8192";
pub const DEFAULT_YOUTUBE_BASE_URL: &str = "https://www.youtube.com";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub groq_api_key: String,
    pub groq_api_url: String,
    pub groq_model: String,
    pub youtube_base_url: String,
    pub transcript_attempts: u32,
    pub transcript_retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Missing optional keys
    /// fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let groq_api_key = lookup("GROQ_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::ConfigError("GROQ_API_KEY is not set".to_string()))?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let ip = IpAddr::from_str(&host)
            .map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;
        let port: u16 = parse_or(&lookup, "PORT", 5000)?;

        let transcript_attempts: u32 = parse_or(&lookup, "TRANSCRIPT_RETRIES", 3)?;
        if transcript_attempts == 0 {
            return Err(AppError::ConfigError(
                "TRANSCRIPT_RETRIES must be at least 1".to_string(),
            ));
        }
        let retry_delay_secs: u64 = parse_or(&lookup, "TRANSCRIPT_RETRY_DELAY_SECS", 2)?;
        let timeout_secs: u64 = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 90)?;

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            groq_api_key,
            groq_api_url: lookup("GROQ_API_URL").unwrap_or_else(|| DEFAULT_GROQ_API_URL.to_string()),
            groq_model: lookup("GROQ_MODEL").unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string()),
            youtube_base_url: lookup("YOUTUBE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_YOUTUBE_BASE_URL.to_string()),
            transcript_attempts,
            transcript_retry_delay: Duration::from_secs(retry_delay_secs),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
