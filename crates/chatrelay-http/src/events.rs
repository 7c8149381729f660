//! Server-sent event relay for browsers.
//!
//! Clients connect to `/api/events?session=ID&directory=D` and receive that
//! session's decoded events, one SSE frame per event with the event type as
//! the SSE `event` name and the [`ChatEvent`] JSON as `data`.
//!
//! Streams end when the server begins shutting down, so graceful shutdown
//! does not wait on open browser tabs.
//!
//! [`ChatEvent`]: chatrelay_core::ChatEvent

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};

use chatrelay_core::event_bus::RelayEvent;

use crate::routes::{non_empty, ApiReply, ApiResponse};
use crate::SharedState;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub session: Option<String>,
    pub directory: Option<String>,
}

/// Handler for GET /api/events
pub async fn events_handler(
    State(state): State<Arc<SharedState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiReply> {
    let Some(session) = non_empty(query.session) else {
        return Err(ApiResponse::failure(
            StatusCode::BAD_REQUEST,
            "Missing required parameter: session",
        ));
    };
    let directory = state
        .client
        .resolve_directory(non_empty(query.directory).as_deref())
        .to_string();

    // Subscribe before starting upstream so no early event is missed
    let rx = state.event_bus.subscribe();
    state.hub.ensure(&directory);
    log::debug!("Browser stream opened for {} in {}", session, directory);

    let stream = session_stream(rx, directory, session).take_until(state.shutdown_signal());
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Events from `rx` for one session, as SSE frames.
fn session_stream(
    rx: broadcast::Receiver<RelayEvent>,
    directory: String,
    session: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, move |mut rx| {
        let directory = directory.clone();
        let session = session.clone();
        async move {
            loop {
                match rx.recv().await {
                    Ok(relayed) if relayed.is_for(&directory, &session) => {
                        match Event::default()
                            .event(relayed.event.event_type())
                            .json_data(&relayed.event)
                        {
                            Ok(event) => return Some((Ok(event), rx)),
                            Err(e) => log::warn!("Failed to encode event: {}", e),
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(count)) => {
                        log::warn!("Browser stream for {} lagged by {} events", session, count);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }
    })
}

// ============================================================================
// TESTS
// ============================================================================
