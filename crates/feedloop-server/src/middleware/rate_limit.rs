use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Sliding one-minute window shared by every route it is layered on.
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<RateLimitState>>,
}

struct RateLimitState {
    limit: u64,
    window: Duration,
    hits: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: Option<u64>) -> Option<Self> {
        limit_per_minute
            .filter(|limit| *limit > 0)
            .map(|limit| Self::with_window(limit, Duration::from_secs(60)))
    }

    fn with_window(limit: u64, window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(RateLimitState {
                limit,
                window,
                hits: VecDeque::new(),
            })),
        }
    }

    fn allow(&self) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        while let Some(front) = state.hits.front() {
            if now.duration_since(*front) > state.window {
                state.hits.pop_front();
            } else {
                break;
            }
        }

        if state.hits.len() as u64 >= state.limit {
            return false;
        }

        state.hits.push_back(now);
        true
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    if !limiter.allow() {
        tracing::warn!(path = %req.uri().path(), "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "Rate limit exceeded"})),
        )
            .into_response();
    }

    next.run(req).await
}
