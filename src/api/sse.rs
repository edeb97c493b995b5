//! Server-Sent Events for session and gateway events

use super::AppState;
use crate::events::SessionEvent;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

fn to_sse(event: &SessionEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(event.event_type()).data(data)
}

/// SSE events handler
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let event_rx = state.event_tx.subscribe();

    let broadcast_stream = BroadcastStream::new(event_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(to_sse(&event))),
        Err(e) => {
            tracing::warn!("SSE subscriber lagged: {}", e);
            None
        }
    });

    let heartbeat_stream = IntervalStream::new(tokio::time::interval(Duration::from_secs(30)))
        .map(|_| {
            let data = serde_json::json!({
                "type": "heartbeat",
                "timestamp": chrono::Utc::now().to_rfc3339(),
            });
            Ok(Event::default().event("heartbeat").data(data.to_string()))
        });

    let merged_stream = futures::stream::select(broadcast_stream, heartbeat_stream);

    Sse::new(merged_stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
