//! Discord webhook channel
//!
//! Posts each item as a single embed: the category as title, the text as
//! description and a colour per category.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use url::Url;

use crate::channels::{Channel, Delivery};
use crate::error::{CredentialError, DeliveryError, Result};
use crate::types::ContentItem;

/// Discord embed descriptions are capped at 4096 characters
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

const DEFAULT_COLOR: u32 = 0x95A5A6;

/// Embed colour for a category
pub fn category_color(category: &str) -> u32 {
    match category {
        "goal" => 0x2ECC71,
        "plan" => 0x3498DB,
        "campaign" => 0xE74C3C,
        _ => DEFAULT_COLOR,
    }
}

pub struct DiscordChannel {
    webhook_url: Url,
    client: Client,
}

impl DiscordChannel {
    /// Create a channel posting to `webhook_url`
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Invalid` if the URL is not an http(s) URL, or
    /// an error if the HTTP client cannot be built.
    pub fn new(webhook_url: &str, timeout: Duration) -> Result<Self> {
        let webhook_url = Url::parse(webhook_url).map_err(|e| CredentialError::Invalid {
            name: "DISCORD_WEBHOOK_URL".to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(webhook_url.scheme(), "http" | "https") {
            return Err(CredentialError::Invalid {
                name: "DISCORD_WEBHOOK_URL".to_string(),
                reason: "must start with http:// or https://".to_string(),
            }
            .into());
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            webhook_url,
            client,
        })
    }

    fn build_payload(&self, item: &ContentItem, text: &str) -> serde_json::Value {
        serde_json::json!({
            "embeds": [{
                "title": item.category.to_uppercase(),
                "description": text,
                "color": category_color(&item.category),
                "timestamp": Utc::now().to_rfc3339(),
                "footer": { "text": "Rotacast" },
            }]
        })
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(EMBED_DESCRIPTION_LIMIT)
    }

    async fn deliver(&self, item: &ContentItem, text: &str) -> std::result::Result<Delivery, DeliveryError> {
        let payload = self.build_payload(item, text);

        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!("Discord webhook accepted post ({})", status);
            return Ok(Delivery::empty());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::from_status(status.as_u16(), body))
    }
}
