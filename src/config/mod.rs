mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./config.toml",
        "./seriesdock.toml",
        "~/.config/seriesdock/config.toml",
        "/etc/seriesdock/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found
    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.ingest.workers == 0 {
        anyhow::bail!("Ingest worker count cannot be 0");
    }

    if config.ingest.queue_capacity == 0 {
        anyhow::bail!("Ingest queue capacity cannot be 0");
    }

    if config.sessions.ttl_secs == 0 {
        anyhow::bail!("Batch session TTL cannot be 0");
    }

    if config.confirmation.pending_ttl_secs == 0 {
        anyhow::bail!("Pending upload TTL cannot be 0");
    }

    if config.resolver.base_url.is_empty() {
        anyhow::bail!("Resolver base URL cannot be empty");
    }

    if config.resolver.api_key.is_empty() {
        tracing::warn!("Resolver API key is empty; metadata lookups will fail");
    }

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tracing::warn!("Database directory does not exist: {:?}", parent);
        }
    }

    for notifier in &config.notifiers {
        if notifier.enabled && notifier.url.is_empty() {
            anyhow::bail!("Notifier '{}' has no URL", notifier.name);
        }
    }

    Ok(())
}
