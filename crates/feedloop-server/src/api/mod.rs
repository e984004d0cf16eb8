pub mod replies;
pub mod response;
pub mod state;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::middleware::{RateLimiter, rate_limit_middleware};
use replies::stream_reply;
use state::AppState;

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// Application routes; rate limiting covers the relay endpoint only.
pub fn router(state: AppState, rate_limiter: Option<RateLimiter>) -> Router {
    let mut relay = Router::new().route("/api/replies/stream", post(stream_reply));
    if let Some(limiter) = rate_limiter {
        relay = relay.layer(from_fn_with_state(limiter, rate_limit_middleware));
    }

    Router::new()
        .route("/health", get(health))
        .merge(relay)
        .with_state(state)
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
