use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use agent_gateway_service::access_guard::AccessGuard;
use agent_gateway_service::agent_client::ResponsesClient;
use agent_gateway_service::config::{AllowedOrigins, GatewayConfig, RATE_WINDOW};
use agent_gateway_service::rate_limiter::RateLimiter;
use agent_gateway_service::server::{bind_with_fallback, build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting assistant gateway...");

    let config = GatewayConfig::from_env().context("Refusing to start")?;

    let client = ResponsesClient::new(&config);
    let agent_name = client
        .resolve_agent(&config.agent_name)
        .await
        .context("Refusing to start")?;

    let access_guard = AccessGuard::new(config.shared_key.clone());
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_minute, RATE_WINDOW));

    let state = Arc::new(AppState {
        access_guard,
        rate_limiter,
        agent: Arc::new(client),
        agent_name,
        tool_approval: config.tool_approval.clone(),
    });

    let app = build_router(Arc::clone(&state), &config.allowed_origins);

    let listener = bind_with_fallback(config.port).await?;
    let addr = listener.local_addr()?;
    info!("Server listening on http://{}:{}", addr.ip(), addr.port());
    info!("Agent: {}", state.agent_name);
    info!(
        "Rate limit: {} requests per {} seconds",
        state.rate_limiter.limit(),
        state.rate_limiter.window().as_secs()
    );
    info!(
        "Shared key: {}",
        if state.access_guard.is_open() { "not configured (open mode)" } else { "configured" }
    );
    match &config.allowed_origins {
        AllowedOrigins::Any => info!("CORS: all origins"),
        AllowedOrigins::List(list) => info!("CORS: {}", list.join(", ")),
    }
    if state.tool_approval.enabled {
        info!("Tool auto-approval enabled for: {:?}", state.tool_approval.tool_names);
    }
    info!("Available endpoints:");
    info!("  GET  /health - Health check");
    info!("  POST /api/assistant - Relay a message to the agent");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
