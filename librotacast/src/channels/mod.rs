//! Delivery channels
//!
//! A channel is a destination that content items are published to. Each
//! implementation wraps one remote API and reports every failure as a
//! [`DeliveryError`] so the publisher can tell transient problems from
//! configuration problems.
//!
//! # Examples
//!
//! ```no_run
//! use librotacast::channels::{Channel, discord::DiscordChannel};
//! use librotacast::types::ContentItem;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let channel = DiscordChannel::new(
//!     "https://discord.com/api/webhooks/123/abc",
//!     std::time::Duration::from_secs(10),
//! )?;
//!
//! let item = ContentItem::new(0, "Ship the release notes", "plan");
//! let delivery = channel.deliver(&item, &item.text).await?;
//! println!("Delivered to {}: {:?}", channel.name(), delivery.extra);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::types::ContentItem;

pub mod discord;
pub mod twitter;

// Mock channel is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Marker appended to text cut down to a channel's character limit
pub const TRUNCATION_MARKER: &str = "...";

/// Metadata returned by a successful delivery
///
/// The fields in `extra` are stored alongside the post record, e.g. the
/// remote message id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delivery {
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Delivery {
    /// A delivery with no metadata
    pub fn empty() -> Self {
        Self::default()
    }

    /// A delivery carrying a single metadata field
    pub fn with_field(key: &str, value: impl Into<serde_json::Value>) -> Self {
        let mut extra = serde_json::Map::new();
        extra.insert(key.to_string(), value.into());
        Self { extra }
    }
}

/// Delivery capability for one destination
#[async_trait]
pub trait Channel: Send + Sync {
    /// Lowercase identifier, also the key of this channel's posting state
    fn name(&self) -> &str;

    /// Maximum post length in characters, or `None` for no limit
    fn character_limit(&self) -> Option<usize>;

    /// Publish `text` for `item`.
    ///
    /// `text` is the item's text after channel constraints (truncation) have
    /// been applied; `item` is passed for metadata such as the category.
    ///
    /// # Errors
    ///
    /// Returns a recoverable `DeliveryError` (timeout, rate limit, network,
    /// server error) or a fatal one (authentication, rejected request).
    async fn deliver(&self, item: &ContentItem, text: &str) -> Result<Delivery, DeliveryError>;
}

/// Cut `text` down to `limit` characters, ending with [`TRUNCATION_MARKER`].
///
/// Returns `None` when the text already fits.
pub fn truncate_to_limit(text: &str, limit: usize) -> Option<String> {
    let length = text.chars().count();
    if length <= limit {
        return None;
    }

    let keep = limit.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    Some(truncated)
}
