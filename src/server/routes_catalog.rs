//! Read-side catalog routes.
//!
//! Collections, series, seasons, and episodes are served straight from the
//! catalog tables. Every listing reflects the hierarchy the ingest path
//! maintains; nothing here mutates state except collection creation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use seriesdock_common::{CollectionId, EpisodeId, SeasonId, SeriesId};
use seriesdock_db::queries::{collections, episodes, seasons, series};
use seriesdock_db::{get_conn, PooledConnection};

use super::{error_response, AppContext};

/// Create catalog routes.
pub fn catalog_routes() -> Router<AppContext> {
    Router::new()
        .route("/collections", get(list_collections).post(create_collection))
        .route("/collections/:collection_id", get(get_collection))
        .route("/collections/:collection_id/series", get(list_series))
        .route("/series/:series_id", get(get_series))
        .route("/series/:series_id/seasons", get(list_seasons))
        .route("/series/:series_id/episodes", get(list_series_episodes))
        .route("/seasons/:season_id/episodes", get(list_season_episodes))
        .route("/episodes/:episode_id", get(get_episode))
        .route("/stats", get(get_stats))
}

// ============================================================================
// Request/Response types
// ============================================================================

/// Request to create a collection.
#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    /// Display name, also the source of the URL slug
    pub name: String,
    /// Actor that owns the collection, if known
    #[serde(default)]
    pub owner_actor_id: Option<i64>,
}

/// Catalog-wide totals.
#[derive(Debug, serde::Serialize)]
pub struct StatsResponse {
    pub collections: i64,
    pub series: i64,
    pub seasons: i64,
    pub episodes: i64,
    pub inboxes: i64,
    pub pending_confirmations: i64,
    pub storage_bytes: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// List all collections.
pub async fn list_collections(State(ctx): State<AppContext>) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    match collections::list_collections(&conn) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(e),
    }
}

/// Create a new collection.
pub async fn create_collection(
    State(ctx): State<AppContext>,
    Json(request): Json<CreateCollectionRequest>,
) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    match collections::create_collection(&conn, &request.name, request.owner_actor_id) {
        Ok(collection) => {
            tracing::info!("Created collection '{}' ({})", collection.name, collection.id);
            (StatusCode::CREATED, Json(collection)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Get a collection by ID.
pub async fn get_collection(
    State(ctx): State<AppContext>,
    Path(collection_id): Path<String>,
) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    let id = match collection_id.parse::<CollectionId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid collection ID"})),
            )
                .into_response()
        }
    };

    match collections::get_collection(&conn, id) {
        Ok(collection) => Json(collection).into_response(),
        Err(e) => error_response(e),
    }
}

/// List series in a collection.
pub async fn list_series(
    State(ctx): State<AppContext>,
    Path(collection_id): Path<String>,
) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    let id = match collection_id.parse::<CollectionId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid collection ID"})),
            )
                .into_response()
        }
    };

    match series::list_series_for_collection(&conn, id) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(e),
    }
}

/// Get a series by ID.
pub async fn get_series(
    State(ctx): State<AppContext>,
    Path(series_id): Path<String>,
) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    let id = match series_id.parse::<SeriesId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid series ID"})),
            )
                .into_response()
        }
    };

    match series::get_series(&conn, id) {
        Ok(series) => Json(series).into_response(),
        Err(e) => error_response(e),
    }
}

/// List seasons of a series.
pub async fn list_seasons(
    State(ctx): State<AppContext>,
    Path(series_id): Path<String>,
) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    let id = match series_id.parse::<SeriesId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid series ID"})),
            )
                .into_response()
        }
    };

    match seasons::list_seasons_for_series(&conn, id) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(e),
    }
}

/// List all episodes of a series across seasons.
pub async fn list_series_episodes(
    State(ctx): State<AppContext>,
    Path(series_id): Path<String>,
) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    let id = match series_id.parse::<SeriesId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid series ID"})),
            )
                .into_response()
        }
    };

    match episodes::list_episodes_for_series(&conn, id) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(e),
    }
}

/// List episodes of a season.
pub async fn list_season_episodes(
    State(ctx): State<AppContext>,
    Path(season_id): Path<String>,
) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    let id = match season_id.parse::<SeasonId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid season ID"})),
            )
                .into_response()
        }
    };

    match episodes::list_episodes_for_season(&conn, id) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(e),
    }
}

/// Get an episode by ID, including its storage reference fields.
pub async fn get_episode(
    State(ctx): State<AppContext>,
    Path(episode_id): Path<String>,
) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    let id = match episode_id.parse::<EpisodeId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid episode ID"})),
            )
                .into_response()
        }
    };

    match episodes::get_episode(&conn, id) {
        Ok(episode) => Json(episode).into_response(),
        Err(e) => error_response(e),
    }
}

/// Get catalog-wide statistics.
pub async fn get_stats(State(ctx): State<AppContext>) -> impl IntoResponse {
    let conn = match get_conn(&ctx.pool) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    match compute_catalog_stats(&conn) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(e),
    }
}

fn compute_catalog_stats(conn: &PooledConnection) -> seriesdock_common::Result<StatsResponse> {
    let count = |sql: &str| -> seriesdock_common::Result<i64> {
        conn.query_row(sql, [], |row| row.get(0))
            .map_err(|e| seriesdock_common::Error::database(e.to_string()))
    };

    Ok(StatsResponse {
        collections: count("SELECT COUNT(*) FROM collections")?,
        series: count("SELECT COUNT(*) FROM series")?,
        seasons: count("SELECT COUNT(*) FROM seasons")?,
        episodes: count("SELECT COUNT(*) FROM episodes")?,
        inboxes: count("SELECT COUNT(*) FROM inboxes")?,
        pending_confirmations: count(
            "SELECT COUNT(*) FROM pending_uploads WHERE state = 'pending'",
        )?,
        storage_bytes: count("SELECT COALESCE(SUM(file_size), 0) FROM episodes")?,
    })
}
