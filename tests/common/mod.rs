//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, default config,
//! EventBus, and full [`AppContext`]. The [`with_server`] constructor starts
//! Axum on a random port for HTTP-level testing; [`with_resolver`] points the
//! metadata resolver at a wiremock server.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use seriesdock::config::Config;
use seriesdock::confirm::ConfirmationService;
use seriesdock::events::EventBus;
use seriesdock::ingest::{IngestPipeline, IngestQueue, NewFileEvent};
use seriesdock::metadata::{MetadataResolver, TmdbResolver};
use seriesdock::server::{create_router, AppContext};
use seriesdock::sessions::BatchSessions;
use seriesdock_common::CollectionId;
use seriesdock_db::models::{Collection, Inbox};
use seriesdock_db::pool::{get_conn, init_memory_pool, init_pool, DbPool, PooledConnection};
use seriesdock_db::queries::{collections, inboxes};

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory database.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub pipeline: Arc<IngestPipeline>,
    // Keeps a file-backed database alive for the harness lifetime.
    _data_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    /// Create a new harness with default configuration and in-memory DB.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a harness whose resolver talks to the given base URL
    /// (typically a wiremock server).
    pub fn with_resolver(base_url: &str) -> Self {
        Self::with_config(resolver_config(base_url))
    }

    /// Create a new harness with a custom configuration and in-memory DB.
    pub fn with_config(config: Config) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        Self::assemble(config, db, None)
    }

    /// Create a harness backed by a file database in a temp directory.
    ///
    /// WAL journaling on a real file handles concurrent writers, which the
    /// shared-cache in-memory database does not; concurrency tests use this.
    pub fn with_file_db(base_url: &str) -> Self {
        let data_dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = data_dir.path().join("seriesdock-test.db");
        let db = init_pool(&db_path.to_string_lossy()).expect("failed to create file pool");
        Self::assemble(resolver_config(base_url), db, Some(data_dir))
    }

    fn assemble(config: Config, db: DbPool, data_dir: Option<tempfile::TempDir>) -> Self {
        let bus = Arc::new(EventBus::new());
        let sessions = BatchSessions::new(config.sessions.ttl_secs);
        let resolver: Arc<dyn MetadataResolver> = Arc::new(TmdbResolver::new(&config.resolver));

        let pipeline = Arc::new(IngestPipeline::new(
            db.clone(),
            resolver.clone(),
            sessions.clone(),
            bus.clone(),
            config.resolver.selection_policy,
        ));
        let queue = Arc::new(IngestQueue::new(
            pipeline.clone(),
            config.ingest.workers,
            config.ingest.queue_capacity,
        ));
        let confirmations = Arc::new(ConfirmationService::new(
            db.clone(),
            pipeline.clone(),
            resolver,
            bus.clone(),
        ));

        let ctx = AppContext {
            pool: db.clone(),
            config: Arc::new(config),
            bus,
            sessions,
            queue,
            confirmations,
        };

        Self {
            ctx,
            db,
            pipeline,
            _data_dir: data_dir,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::serve(Self::new()).await
    }

    /// Start an Axum server whose resolver talks to the given base URL.
    pub async fn with_server_and_resolver(base_url: &str) -> (Self, SocketAddr) {
        Self::serve(Self::with_resolver(base_url)).await
    }

    async fn serve(harness: Self) -> (Self, SocketAddr) {
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> PooledConnection {
        get_conn(&self.db).expect("failed to get db connection")
    }

    /// Create a collection directly in the database.
    pub fn seed_collection(&self, name: &str) -> Collection {
        let conn = self.conn();
        collections::create_collection(&conn, name, Some(99)).expect("failed to create collection")
    }

    /// Register an inbox directly in the database.
    pub fn seed_inbox(&self, external_id: i64, name: &str, collection_id: CollectionId) -> Inbox {
        let conn = self.conn();
        inboxes::register_inbox(&conn, external_id, name, collection_id)
            .expect("failed to register inbox")
    }
}

fn resolver_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.resolver.api_key = "test-key".to_string();
    config.resolver.base_url = base_url.to_string();
    config
}

/// Build a file event with distinct, recognizable identifiers.
pub fn file_event(inbox_id: i64, message_id: i64, unique: &str, filename: &str) -> NewFileEvent {
    NewFileEvent {
        inbox_id,
        message_id,
        file_unique_id: unique.to_string(),
        file_handle: format!("handle-{unique}"),
        filename: filename.to_string(),
        size: Some(700_000_000),
        mime_type: Some("video/x-matroska".to_string()),
        origin_actor_id: Some(7),
    }
}
