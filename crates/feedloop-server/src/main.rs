#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod api;
mod config;
mod middleware;

use anyhow::Context;
use api::state::AppContext;
use config::{LogFormat, ServerConfig};
use middleware::RateLimiter;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,feedloop_server=debug,feedloop_core=debug".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load()?;
    init_tracing(config.log_format);

    tracing::info!("Starting Feedloop reply relay");

    let state = AppContext::from_config(&config)?;
    let rate_limiter = RateLimiter::new(config.rate_limit_per_minute);
    if let Some(rpm) = config.rate_limit_per_minute {
        tracing::info!(requests_per_minute = rpm, "Rate limiting relay requests");
    }

    let app = api::router(state, rate_limiter)
        .layer(api::cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http());

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;

    tracing::info!(
        model = %config.llm.model,
        top_k = config.relay.top_k,
        "Feedloop relay listening on http://{}",
        address
    );

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")
}
