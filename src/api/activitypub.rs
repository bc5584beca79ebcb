//! ActivityPub endpoints
//!
//! - Shared inbox (activity receiving)

use std::time::Instant;

use axum::body::Bytes;
use axum::{
    Router,
    extract::{OriginalUri, State},
    response::{IntoResponse, Response},
    routing::post,
};
use http::{HeaderMap, Method, StatusCode};

use crate::AppState;
use crate::federation::InboundRequest;
use crate::metrics::observe_inbox_request;

/// Create ActivityPub router
///
/// Routes:
/// - POST /inbox - Shared inbox
pub fn inbox_router() -> Router<AppState> {
    Router::new().route("/inbox", post(inbox))
}

/// POST /inbox
///
/// Receives signed activities from remote servers.
///
/// Replies `202 Accepted` with an empty body once the activity is stored.
/// Failures are rendered as plain text; see [`crate::error::AppError`].
async fn inbox(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request = InboundRequest {
        method,
        uri,
        headers,
        body,
    };

    let response = match state.inbox.handle(&request).await {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(error) => {
            error.into_response_with(state.config.federation.expose_internal_errors)
        }
    };

    observe_inbox_request(response.status().as_u16(), started.elapsed());
    response
}
