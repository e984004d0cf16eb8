use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use feedloop_core::{RelayError, RelayEvent, RelayRequest, RelaySession, RelayStream};
use futures::{Stream, StreamExt};
use tokio_util::sync::DropGuard;

use super::{response::ApiResponse, state::AppState};

// POST /api/replies/stream
pub async fn stream_reply(
    State(state): State<AppState>,
    payload: Result<Json<RelayRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected relay request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("bad_request", rejection.body_text())),
            )
                .into_response();
        }
    };

    let session = match state.relay.prepare(request).await {
        Ok(session) => session,
        Err(err) => return error_response(&err),
    };

    Sse::new(event_stream(session))
        .keep_alive(KeepAlive::new().interval(state.keep_alive))
        .into_response()
}

/// SSE events of a prepared session. Dropping the stream (the client
/// disconnected) cancels the session.
pub(crate) fn event_stream(
    session: RelaySession,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let guard = session.cancel_token().drop_guard();
    CancelOnDrop {
        inner: session.into_stream(),
        _guard: guard,
    }
    .map(|event| Ok::<_, Infallible>(to_sse_event(&event)))
}

fn error_response(err: &RelayError) -> Response {
    let status = match err {
        RelayError::NotFound(_) => StatusCode::NOT_FOUND,
        RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        RelayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RelayError::UpstreamAuth(_)
        | RelayError::Upstream(_)
        | RelayError::UpstreamTimeout(_)
        | RelayError::MalformedUpstreamFrame(_) => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        tracing::error!(code = err.code(), error = %err, "Relay request failed before streaming");
    }
    (status, Json(ApiResponse::error(err.code(), err.to_string()))).into_response()
}

fn to_sse_event(event: &RelayEvent) -> Event {
    let sse = match event.event_name() {
        Some(name) => Event::default().event(name),
        None => Event::default(),
    };
    sse.data(event.data())
}

struct CancelOnDrop {
    inner: RelayStream,
    _guard: DropGuard,
}

impl Stream for CancelOnDrop {
    type Item = RelayEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
