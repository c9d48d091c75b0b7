use tokio::net::TcpListener;
use tracing::info;
use tube_summarizer::{AppState, api::routes::create_router, config::Config, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    // Load configuration
    let config = Config::load()?;
    let server_addr = config.server_addr;
    info!(model = %config.groq_model, "starting summarizer on {}", server_addr);

    let app = create_router(AppState::from_config(config));

    let listener = TcpListener::bind(server_addr).await?;
    info!("listening on {}", server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
