//! Admin routes for inbox registration, batch sessions, and confirmations.
//!
//! These routes assume an already-authenticated caller; anything that can
//! reach them is allowed to manage the catalog. Batch session changes are
//! announced on the event bus so connected clients see routing flips live.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use seriesdock_common::{CollectionId, PendingUploadId};
use seriesdock_db::models::{PendingState, PendingUpload};
use seriesdock_db::queries::{collections, inboxes, maintenance, pending};
use seriesdock_db::get_conn;

use crate::confirm::Decision;
use crate::events::CatalogEvent;

use super::{error_response, AppContext};

/// Create admin routes.
pub fn admin_routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/inboxes", get(list_inboxes).post(register_inbox))
        .route(
            "/admin/inboxes/:external_id",
            axum::routing::delete(deactivate_inbox),
        )
        .route(
            "/admin/inboxes/:external_id/batch",
            post(start_batch).delete(stop_batch),
        )
        .route("/admin/pending", get(list_pending))
        .route("/admin/pending/:pending_id/confirm", post(confirm_pending))
        .route("/admin/pending/:pending_id/reject", post(reject_pending))
        .route("/admin/recount", post(recount_counters))
}

// ============================================================================
// Request/Response types
// ============================================================================

/// Request to register (or re-point) an inbox.
#[derive(Debug, Deserialize)]
pub struct RegisterInboxRequest {
    /// Channel identifier on the messaging side
    pub external_id: i64,
    /// Display name used in logs and listings
    pub name: String,
    /// Collection imports from this inbox are filed under by default
    pub collection_id: CollectionId,
}

/// Request to start a batch session on an inbox.
#[derive(Debug, Default, Deserialize)]
pub struct StartBatchRequest {
    /// Target collection; defaults to the inbox's bound collection
    #[serde(default)]
    pub collection_id: Option<CollectionId>,
}

/// Query parameters for the pending upload listing.
#[derive(Debug, Deserialize)]
pub struct ListPendingQuery {
    /// State filter; defaults to `pending`
    #[serde(default)]
    pub state: Option<String>,
}

/// Request body for a confirmation, with an optional collection override.
#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub collection_id: Option<CollectionId>,
}

/// Outcome of a confirm or reject call.
#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    /// Whether this call performed the state transition
    pub applied: bool,
    /// Import outcome label when a promotion ran ("imported", "duplicate", ...)
    pub import: Option<&'static str>,
    /// The pending row after the decision
    pub pending: PendingUpload,
}

impl From<Decision> for DecisionResponse {
    fn from(decision: Decision) -> Self {
        Self {
            applied: decision.applied,
            import: decision.import.as_ref().map(|outcome| outcome.label()),
            pending: decision.pending,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List all registered inboxes.
pub async fn list_inboxes(State(ctx): State<AppContext>) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    match inboxes::list_inboxes(&conn) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(e),
    }
}

/// Register an inbox, or re-point an existing registration.
pub async fn register_inbox(
    State(ctx): State<AppContext>,
    Json(request): Json<RegisterInboxRequest>,
) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    match inboxes::register_inbox(
        &conn,
        request.external_id,
        &request.name,
        request.collection_id,
    ) {
        Ok(inbox) => {
            tracing::info!(
                "Registered inbox '{}' ({}) into collection {}",
                inbox.name,
                inbox.external_id,
                inbox.collection_id
            );
            (StatusCode::CREATED, Json(inbox)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Deactivate an inbox. Files arriving from it are ignored afterwards.
pub async fn deactivate_inbox(
    State(ctx): State<AppContext>,
    Path(external_id): Path<String>,
) -> impl IntoResponse {
    let Ok(external_id) = external_id.parse::<i64>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid inbox ID"})),
        )
            .into_response();
    };

    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    match inboxes::deactivate_inbox(&conn, external_id) {
        Ok(true) => {
            // A deactivated inbox cannot keep routing a batch.
            if ctx.sessions.stop(external_id) {
                ctx.bus.broadcast(CatalogEvent::batch_stopped(external_id));
            }
            tracing::info!("Deactivated inbox {}", external_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Inbox not found"})),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Start a batch session routing an inbox into a collection.
pub async fn start_batch(
    State(ctx): State<AppContext>,
    Path(external_id): Path<String>,
    request: Option<Json<StartBatchRequest>>,
) -> impl IntoResponse {
    let Ok(external_id) = external_id.parse::<i64>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid inbox ID"})),
        )
            .into_response();
    };
    let Json(request) = request.unwrap_or_default();

    let collection = {
        let conn = match get_conn(&ctx.pool) {
            Ok(c) => c,
            Err(e) => return error_response(e),
        };

        let inbox = match inboxes::get_inbox_by_external_id(&conn, external_id) {
            Ok(Some(inbox)) => inbox,
            Ok(None) => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(serde_json::json!({"error": "Inbox not found"})),
                )
                    .into_response()
            }
            Err(e) => return error_response(e),
        };
        if !inbox.is_active {
            return (
                StatusCode::CONFLICT,
                Json(serde_json::json!({"error": "Inbox is deactivated"})),
            )
                .into_response();
        }

        let target = request.collection_id.unwrap_or(inbox.collection_id);
        match collections::get_collection(&conn, target) {
            Ok(collection) => collection,
            Err(e) => return error_response(e),
        }
    };

    ctx.sessions.start(external_id, collection.id);
    ctx.bus
        .broadcast(CatalogEvent::batch_started(external_id, collection.id));
    tracing::info!(
        "Batch started: inbox {} now imports into '{}'",
        external_id,
        collection.name
    );

    Json(serde_json::json!({
        "status": "started",
        "inbox_external_id": external_id,
        "collection_id": collection.id,
    }))
    .into_response()
}

/// Stop the batch session on an inbox. A no-op when none is active.
pub async fn stop_batch(
    State(ctx): State<AppContext>,
    Path(external_id): Path<String>,
) -> impl IntoResponse {
    let Ok(external_id) = external_id.parse::<i64>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid inbox ID"})),
        )
            .into_response();
    };

    if ctx.sessions.stop(external_id) {
        ctx.bus.broadcast(CatalogEvent::batch_stopped(external_id));
        tracing::info!("Batch stopped on inbox {}", external_id);
        Json(serde_json::json!({"status": "stopped"})).into_response()
    } else {
        Json(serde_json::json!({"status": "idle"})).into_response()
    }
}

/// List pending uploads, filtered by state (default `pending`), oldest first.
pub async fn list_pending(
    State(ctx): State<AppContext>,
    Query(query): Query<ListPendingQuery>,
) -> impl IntoResponse {
    let state = match query.state.as_deref() {
        None => PendingState::Pending,
        Some(raw) => match raw.parse::<PendingState>() {
            Ok(state) => state,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": "Invalid pending state"})),
                )
                    .into_response()
            }
        },
    };

    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    match pending::list_pending_by_state(&conn, state) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(e),
    }
}

/// Confirm a pending upload, importing its file into the catalog.
pub async fn confirm_pending(
    State(ctx): State<AppContext>,
    Path(pending_id): Path<String>,
    request: Option<Json<ConfirmRequest>>,
) -> impl IntoResponse {
    let id = match pending_id.parse::<PendingUploadId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid pending upload ID"})),
            )
                .into_response()
        }
    };
    let Json(request) = request.unwrap_or_default();

    match ctx.confirmations.confirm(id, request.collection_id).await {
        Ok(decision) => Json(DecisionResponse::from(decision)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Reject a pending upload, discarding its file.
pub async fn reject_pending(
    State(ctx): State<AppContext>,
    Path(pending_id): Path<String>,
) -> impl IntoResponse {
    let id = match pending_id.parse::<PendingUploadId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid pending upload ID"})),
            )
                .into_response()
        }
    };

    match ctx.confirmations.reject(id).await {
        Ok(decision) => Json(DecisionResponse::from(decision)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Recompute every denormalized counter from the base tables.
pub async fn recount_counters(State(ctx): State<AppContext>) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    match maintenance::recount_all(&conn) {
        Ok(summary) => {
            tracing::info!(
                "Recount complete: {} seasons, {} collections, {} inboxes",
                summary.seasons,
                summary.collections,
                summary.inboxes
            );
            Json(summary).into_response()
        }
        Err(e) => error_response(e),
    }
}
