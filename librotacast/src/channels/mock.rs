//! Mock channel implementation for testing
//!
//! A configurable channel that records what it was asked to deliver and can
//! simulate failures and slow remotes. Clones share their recorded state, so
//! a test can keep one handle while the publisher owns another.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::channels::{Channel, Delivery};
use crate::error::DeliveryError;
use crate::types::ContentItem;

/// Configuration for mock channel behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Channel name (also the posting state key)
    pub name: String,

    /// Error returned by every delivery, `None` to succeed
    pub failure: Option<DeliveryError>,

    /// Delay before completing a delivery (simulates network latency)
    pub delay: Duration,

    /// Character limit reported to the publisher
    pub character_limit: Option<usize>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            failure: None,
            delay: Duration::from_millis(0),
            character_limit: None,
        }
    }
}

/// Mock channel for testing
#[derive(Debug, Clone)]
pub struct MockChannel {
    name: String,
    character_limit: Option<usize>,
    delay: Duration,
    failure: Arc<Mutex<Option<DeliveryError>>>,
    call_count: Arc<Mutex<usize>>,
    delivered: Arc<Mutex<Vec<String>>>,
}

impl MockChannel {
    /// Create a new mock channel with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self {
            name: config.name,
            character_limit: config.character_limit,
            delay: config.delay,
            failure: Arc::new(Mutex::new(config.failure)),
            call_count: Arc::new(Mutex::new(0)),
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock channel that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock channel that always fails with `error`
    pub fn failing(name: &str, error: DeliveryError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            failure: Some(error),
            ..Default::default()
        })
    }

    /// Create a mock channel with a delay
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Create a mock channel with a character limit
    pub fn with_limit(name: &str, limit: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            character_limit: Some(limit),
            ..Default::default()
        })
    }

    /// Change the outcome of subsequent deliveries
    pub fn set_failure(&self, failure: Option<DeliveryError>) {
        *lock(&self.failure) = failure;
    }

    /// Number of times deliver was called
    pub fn call_count(&self) -> usize {
        *lock(&self.call_count)
    }

    /// Text of every successful delivery, in order
    pub fn delivered(&self) -> Vec<String> {
        lock(&self.delivered).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn character_limit(&self) -> Option<usize> {
        self.character_limit
    }

    async fn deliver(&self, _item: &ContentItem, text: &str) -> Result<Delivery, DeliveryError> {
        let call = {
            let mut count = lock(&self.call_count);
            *count += 1;
            *count
        };

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }

        lock(&self.delivered).push(text.to_string());
        Ok(Delivery::with_field(
            "message_id",
            format!("{}-{}", self.name, call),
        ))
    }
}
