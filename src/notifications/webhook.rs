use anyhow::Result;
use reqwest::Client;
use std::time::Duration;

use crate::config::NotifierConfig;
use crate::events::CatalogEvent;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// One configured webhook target receiving catalog events as JSON.
pub struct WebhookClient {
    client: Client,
    url: String,
    token: Option<String>,
    name: String,
}

impl WebhookClient {
    pub fn new(config: &NotifierConfig) -> Self {
        let client = Client::builder()
            .timeout(CONNECTION_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client: {}", e);
                Client::new()
            });

        Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            name: config.name.clone(),
        }
    }

    /// POST one event to the target.
    pub async fn deliver(&self, event: &CatalogEvent) -> Result<()> {
        let mut request = self.client.post(&self.url).json(event);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Webhook delivery failed ({}): {}", status, body);
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
