use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Outbound notification targets. Empty by default.
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./seriesdock.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// API key for the TMDB v3 API
    #[serde(default)]
    pub api_key: String,

    /// Override for tests or proxies (default: the public TMDB endpoint)
    #[serde(default = "default_resolver_base_url")]
    pub base_url: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// How to pick among multiple search candidates (default: first)
    #[serde(default)]
    pub selection_policy: SelectionPolicy,
}

fn default_resolver_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_resolver_base_url(),
            language: default_language(),
            selection_policy: SelectionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Trust the external service's ranking and take the top result
    #[default]
    First,
    HighestRated,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Maximum number of files processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    100
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionsConfig {
    /// Inactivity TTL for a batch session; each ingested file renews it
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
}

fn default_session_ttl() -> u64 {
    900
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfirmationConfig {
    /// Pending uploads older than this are swept to the expired state
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_secs: u64,

    /// Decided (confirmed/rejected/expired) rows older than this are deleted
    #[serde(default = "default_purge_after")]
    pub purge_after_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_pending_ttl() -> u64 {
    48 * 60 * 60
}

fn default_purge_after() -> u64 {
    7 * 24 * 60 * 60
}

fn default_sweep_interval() -> u64 {
    300
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            pending_ttl_secs: default_pending_ttl(),
            purge_after_secs: default_purge_after(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// One outbound webhook receiving catalog events as JSON.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
    /// Display name used in logs.
    pub name: String,

    /// Endpoint the event payloads are POSTed to.
    pub url: String,

    /// Bearer token sent with each delivery, if set.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_notifier_enabled")]
    pub enabled: bool,
}

fn default_notifier_enabled() -> bool {
    true
}
