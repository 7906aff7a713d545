use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, HeaderValue},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::access_guard::{AccessGuard, AGENT_KEY_HEADER};
use crate::agent_client::AgentInvoker;
use crate::config::{AllowedOrigins, ToolApprovalPolicy};
use crate::errors::ServiceError;
use crate::models::{AssistantRequest, AssistantResponse, HealthResponse};
use crate::rate_limiter::RateLimiter;
use crate::shaping::{shape_request, shape_response};

const ANONYMOUS: &str = "anonymous";

#[derive(Clone)]
pub struct AppState {
    pub access_guard: AccessGuard,
    pub rate_limiter: Arc<RateLimiter>,
    pub agent: Arc<dyn AgentInvoker>,
    pub agent_name: String,
    pub tool_approval: ToolApprovalPolicy,
}

pub fn build_router(state: Arc<AppState>, origins: &AllowedOrigins) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/assistant", post(assistant))
        .layer(cors_layer(origins))
        .with_state(state)
}

pub fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    match origins {
        AllowedOrigins::Any => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        AllowedOrigins::List(list) => {
            let parsed: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin {:?}", origin);
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(parsed))
                .allow_methods(AllowMethods::mirror_request())
                .allow_headers(AllowHeaders::mirror_request())
                .allow_credentials(true)
        }
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

fn rate_key(request: &AssistantRequest, peer: Option<SocketAddr>) -> String {
    match (&request.client_id, peer) {
        (Some(client_id), _) if !client_id.is_empty() => client_id.clone(),
        (_, Some(addr)) => addr.ip().to_string(),
        _ => ANONYMOUS.to_string(),
    }
}

async fn assistant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<AssistantRequest>, JsonRejection>,
) -> Result<Json<AssistantResponse>, ServiceError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected assistant request body: {}", rejection.body_text());
        ServiceError::from(rejection)
    })?;

    let provided = headers
        .get(AGENT_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(e) = state.access_guard.verify(provided) {
        warn!("Rejected assistant request: invalid API key");
        return Err(e);
    }

    let key = rate_key(&request, peer.map(|ConnectInfo(addr)| addr));
    if !state.rate_limiter.check_rate_limit(&key) {
        warn!(rate_key = %key, "Rate limit exceeded");
        return Err(ServiceError::RateLimitExceeded);
    }

    let span = tracing::info_span!(
        "assistant",
        request_id = %Uuid::new_v4(),
        rate_key = %key,
        thread_id = request.thread_id.as_deref().unwrap_or("-"),
    );

    async move {
        let call = shape_request(
            &request.message,
            request.stage_id.as_deref(),
            &state.agent_name,
            &state.tool_approval,
        );

        match state.agent.invoke(&call).await {
            Ok(output) => {
                info!("Agent replied");
                Ok(Json(shape_response(output)))
            }
            Err(e) => {
                error!("Agent invocation failed: {}", e);
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

/// Binds `0.0.0.0:<preferred_port>`, falling back to the next ten ports and then
/// to an ephemeral one.
pub async fn bind_with_fallback(preferred_port: u16) -> std::io::Result<TcpListener> {
    let mut candidates: Vec<u16> = vec![preferred_port];
    candidates.extend((1..=10).filter_map(|offset| preferred_port.checked_add(offset)));
    candidates.push(0);

    let mut last_error = None;
    for port in candidates {
        let addr = format!("0.0.0.0:{}", port);
        match TcpListener::bind(&addr).await {
            Ok(listener) => {
                let bound = listener.local_addr()?.port();
                if bound != preferred_port {
                    warn!(
                        "Configured port {} unavailable, listening on {} instead",
                        preferred_port, bound
                    );
                }
                return Ok(listener);
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::AddrInUse {
                    error!("Failed to bind {}: {}", addr, e);
                } else {
                    info!("Port {} in use, trying next...", port);
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| std::io::Error::other("Unable to bind to any port")))
}
