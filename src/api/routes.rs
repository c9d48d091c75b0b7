use axum::{
    Router,
    extract::{Json, State, rejection::JsonRejection},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::AppState;
use crate::api::models::{SummarizeRequest, SummarizeResponse};
use crate::api::response;
use crate::error::{AppError, Result};
use crate::markdown::markdown_to_html;
use crate::youtube::{RetryPolicy, extract_video_id, fetch_with_retry, thumbnail_url};

const INDEX_HTML: &str = include_str!("../../assets/index.html");
const SCRIPT_JS: &str = include_str!("../../assets/script.js");

pub const INVALID_URL_MESSAGE: &str = "Invalid YouTube URL. Please check the URL and try again.";

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/static/script.js", get(script_handler))
        .route("/summarize", post(summarize_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn script_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/javascript; charset=utf-8")], SCRIPT_JS)
}

async fn summarize_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SummarizeRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!(error = %rejection, "rejected summarize body");
            return AppError::BadRequest(rejection.body_text()).into_response();
        }
    };

    let Some(url) = req.url.filter(|url| !url.is_empty()) else {
        warn!("no URL provided in summarize request");
        return AppError::BadRequest("No URL provided".to_string()).into_response();
    };

    info!(%url, "processing summarize request");
    let start_time = Instant::now();

    let result = tokio::time::timeout(
        state.config.request_timeout,
        process_summarize_request(&state, &url),
    )
    .await
    .unwrap_or(Err(AppError::Timeout));

    let elapsed = start_time.elapsed();
    match result {
        Ok(body) => {
            info!(%url, ?elapsed, "summary returned");
            response::success(body).into_response()
        }
        Err(err) => {
            warn!(%url, ?elapsed, status = %err.status(), error = %err, "summarize failed");
            err.into_response()
        }
    }
}

async fn process_summarize_request(state: &AppState, url: &str) -> Result<SummarizeResponse> {
    let video_id = extract_video_id(url)
        .ok_or_else(|| AppError::BadRequest(INVALID_URL_MESSAGE.to_string()))?;

    let transcript = fetch_with_retry(
        state.transcripts.as_ref(),
        &video_id,
        RetryPolicy::from_config(&state.config),
    )
    .await?;

    let summary = state.summarizer.summarize(&transcript).await?;

    Ok(SummarizeResponse {
        summary: markdown_to_html(&summary),
        thumbnail_url: thumbnail_url(&video_id),
    })
}
