use crate::events::CatalogEvent;
use crate::server::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

pub fn sse_routes() -> Router<AppContext> {
    Router::new().route("/events", get(events_handler))
}

pub async fn events_handler(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = ctx.bus.subscribe();

    // Late joiners get a replay of recent events (oldest first) before the
    // live stream takes over.
    let replay = tokio_stream::iter(ctx.bus.recent(50).into_iter().rev());

    let live = BroadcastStream::new(rx).filter_map(|result| result.ok());

    let stream = replay
        .chain(live)
        .map(|event: CatalogEvent| {
            // Serialize the whole event as JSON (the event_type field is the
            // discriminant). Events go out unnamed (no `event:` field) so a
            // browser's EventSource.onmessage receives every one; clients
            // route on event_type in the data.
            let data = serde_json::to_string(&event)
                .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {}"}}"#, e));

            Ok(Event::default().data(data))
        });

    // Heartbeat every 30 seconds so idle connections stay warm
    let heartbeat =
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(Duration::from_secs(30)))
            .map(|_| Ok(Event::default().event("heartbeat").data(r#"{"event_type":"heartbeat"}"#)));

    let combined = stream.merge(heartbeat);

    Sse::new(combined).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
