use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    /// HTML fragment rendered unescaped by the page.
    pub summary: String,
    pub thumbnail_url: String,
}
