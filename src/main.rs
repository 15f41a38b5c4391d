mod cli;

use seriesdock::{
    config, confirm,
    confirm::ConfirmationService,
    events::EventBus,
    ingest::{IngestPipeline, IngestQueue},
    metadata::{MetadataResolver, TmdbResolver},
    notifications::{self, NotificationManager},
    server,
    sessions::{self, BatchSessions},
};
use seriesdock_db::pool::init_pool;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;

async fn start_server(
    host: String,
    port: u16,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    // Load config
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    config.server.host = host;
    config.server.port = port;

    tracing::info!("Starting seriesdock server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    // Initialize database
    let db_path = config.database.path.to_string_lossy();
    tracing::info!("Initializing database at {}", db_path);
    let pool = init_pool(&db_path)?;

    // Wire up the ingest stack
    let bus = Arc::new(EventBus::new());
    let sessions = BatchSessions::new(config.sessions.ttl_secs);
    let resolver: Arc<dyn MetadataResolver> = Arc::new(TmdbResolver::new(&config.resolver));
    if !resolver.is_available() {
        tracing::warn!(
            "Metadata resolver '{}' is not configured; imports will fail to resolve",
            resolver.name()
        );
    }

    let pipeline = Arc::new(IngestPipeline::new(
        pool.clone(),
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
        pool.clone(),
        pipeline.clone(),
        resolver.clone(),
        bus.clone(),
    ));

    // Background tasks: session expiry, pending upload sweeping, and
    // outbound notifications
    let cleanup_task = sessions::start_cleanup_task(sessions.clone(), bus.clone(), 60);
    let sweep_task = confirm::start_sweep_task(pool.clone(), config.confirmation.clone());
    let manager = Arc::new(NotificationManager::new(&config));
    if manager.has_targets() {
        tracing::info!("Notifications enabled");
    }
    let notification_task = notifications::start_notification_task(bus.clone(), manager);

    let host = config.server.host.clone();
    let server_port = config.server.port;
    let ctx = server::AppContext {
        pool,
        config: Arc::new(config),
        bus,
        sessions,
        queue,
        confirmations,
    };

    let server_result = server::start_server(ctx, &host, server_port).await;

    // Cleanup
    tracing::info!("Shutting down...");
    cleanup_task.abort();
    sweep_task.abort();
    notification_task.abort();

    server_result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "seriesdock=trace,seriesdock_db=debug,seriesdock_common=debug,seriesdock_parser=debug,tower_http=debug".to_string()
        } else {
            "seriesdock=debug,seriesdock_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            // Create tokio runtime
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Parse { filename, json } => parse_filename(&filename, json),
        Commands::Recount => recount(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("seriesdock {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn parse_filename(filename: &str, json: bool) -> Result<()> {
    let guess = seriesdock_parser::parse_filename(filename);

    if json {
        println!("{}", serde_json::to_string_pretty(&guess)?);
        return Ok(());
    }

    println!("Filename: {}", filename);
    println!("Kind: {:?}", guess.kind);
    match guess.title {
        Some(ref title) => println!("Title: {}", title),
        None => println!("Title: (none)"),
    }
    if let Some(season) = guess.season {
        println!("Season: {}", season);
    }
    if let Some(episode) = guess.episode {
        println!("Episode: {}", episode);
    }
    if let Some(year) = guess.year {
        println!("Year: {}", year);
    }
    if guess.is_episode_guess() {
        println!("\nUsable episode guess: yes");
    } else {
        println!("\nUsable episode guess: no (would be held as unparsed)");
    }

    Ok(())
}

fn recount(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let db_path = config.database.path.to_string_lossy();
    let pool = init_pool(&db_path)?;
    let conn = pool.get()?;

    let summary = seriesdock_db::queries::maintenance::recount_all(&conn)?;
    println!(
        "Recounted {} seasons, {} collections, {} inboxes",
        summary.seasons, summary.collections, summary.inboxes
    );

    Ok(())
}

fn validate_config(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {:?}", config.database.path);
    println!(
        "  Resolver: {} ({})",
        config.resolver.base_url,
        if config.resolver.api_key.is_empty() {
            "no API key"
        } else {
            "API key set"
        }
    );
    println!("  Ingest workers: {}", config.ingest.workers);
    println!("  Session TTL: {}s", config.sessions.ttl_secs);
    println!(
        "  Notifiers: {} configured",
        config.notifiers.iter().filter(|n| n.enabled).count()
    );

    Ok(())
}
