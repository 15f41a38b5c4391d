//! File intake webhook.
//!
//! The messaging transport (bot, bridge, relay) POSTs one JSON body per
//! received file. Acceptance here only means the event is queued; the
//! ingest workers decide its fate and announce it on the event bus.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::ingest::NewFileEvent;
use crate::server::AppContext;

pub fn webhook_routes() -> Router<AppContext> {
    Router::new().route("/files", post(receive_file))
}

/// Accept one inbound file event and queue it for ingestion.
///
/// Returns 202 as soon as the event is queued. Redeliveries of the same
/// file are safe to POST again; the ingest path deduplicates on
/// `file_unique_id`.
pub async fn receive_file(
    State(ctx): State<AppContext>,
    Json(event): Json<NewFileEvent>,
) -> impl IntoResponse {
    let file_unique_id = event.file_unique_id.clone();
    let filename = event.filename.clone();

    match ctx.queue.submit(event).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "status": "queued",
                "file_unique_id": file_unique_id,
                "filename": filename,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("Failed to queue file event: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}
