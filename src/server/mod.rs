//! HTTP server setup and routing.
//!
//! The API surface splits into three groups: read-only catalog queries
//! under `/api`, admin operations for inbox and confirmation management
//! under `/api/admin`, and the file intake webhook under `/webhook`.
//! Live catalog events stream over SSE at `/api/events`.

pub mod routes_admin;
pub mod routes_catalog;
pub mod routes_sse;
pub mod routes_webhook;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::confirm::ConfirmationService;
use crate::events::EventBus;
use crate::ingest::IngestQueue;
use crate::sessions::BatchSessions;
use seriesdock_db::DbPool;

/// Shared application context passed to all route handlers.
#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool
    pub pool: DbPool,
    /// Application configuration
    pub config: Arc<Config>,
    /// Event bus for SSE broadcasting
    pub bus: Arc<EventBus>,
    /// Active batch sessions keyed by inbox
    pub sessions: BatchSessions,
    /// Intake queue feeding the ingest workers
    pub queue: Arc<IngestQueue>,
    /// Confirmation decisions for held uploads
    pub confirmations: Arc<ConfirmationService>,
}

/// Create the main application router.
pub fn create_router(ctx: AppContext) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // API routes
        .nest("/api", api_routes())
        // File intake webhook
        .nest("/webhook", routes_webhook::webhook_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// API route handlers.
fn api_routes() -> Router<AppContext> {
    Router::new()
        .merge(routes_catalog::catalog_routes())
        .merge(routes_admin::admin_routes())
        .merge(routes_sse::sse_routes())
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Render a storage error as a JSON error body with its mapped status.
pub(crate) fn error_response(err: seriesdock_common::Error) -> axum::response::Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

/// Start the HTTP server.
pub async fn start_server(ctx: AppContext, host: &str, port: u16) -> Result<()> {
    let app = create_router(ctx);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid server address")?;

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind server address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            tracing::info!("Shutdown signal received (SIGTERM)");
        }
    }
}
