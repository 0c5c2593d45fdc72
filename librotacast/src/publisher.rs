//! Channel publisher
//!
//! Runs one publish cycle for one channel: load state, pick the next item,
//! deliver it, and record the outcome. Every failure is converted into a
//! logged [`CycleOutcome`]; nothing here returns an error to the scheduler.
//!
//! An item is only committed after the channel confirms delivery, so a crash
//! or failed save can at worst cause a duplicate post, never a skipped one.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::channels::{truncate_to_limit, Channel};
use crate::error::DeliveryError;
use crate::rotation::select_next;
use crate::source;
use crate::state::StateStore;
use crate::types::{OnEmpty, PostingStateFile};

/// Default bound on a single delivery call
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// What a publish cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The item was delivered and committed
    Posted {
        index: usize,
        extra: serde_json::Map<String, serde_json::Value>,
    },
    /// Nothing eligible to post (empty source, or exhausted with `stop`)
    NothingToPost,
    /// The content source could not be read; state untouched
    SourceUnavailable,
    /// Delivery failed; the item stays eligible for the next cycle
    Failed { index: usize, error: DeliveryError },
}

impl CycleOutcome {
    pub fn is_posted(&self) -> bool {
        matches!(self, CycleOutcome::Posted { .. })
    }
}

/// Publishes a rotating content source to one channel
pub struct ChannelPublisher {
    channel: Box<dyn Channel>,
    source: PathBuf,
    on_empty: OnEmpty,
    store: Arc<dyn StateStore>,
    state_lock: Arc<Mutex<()>>,
    timeout: Duration,
}

impl ChannelPublisher {
    /// Create a publisher with the default `loop` policy and delivery timeout
    pub fn new(
        channel: Box<dyn Channel>,
        source: impl Into<PathBuf>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            channel,
            source: source.into(),
            on_empty: OnEmpty::default(),
            store,
            state_lock: Arc::new(Mutex::new(())),
            timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    pub fn with_on_empty(mut self, on_empty: OnEmpty) -> Self {
        self.on_empty = on_empty;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share a state lock with other publishers using the same store, so their
    /// load-modify-save sequences never interleave.
    pub fn with_state_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.state_lock = lock;
        self
    }

    /// Channel id, also the key of this channel's posting state
    pub fn channel_id(&self) -> &str {
        self.channel.name()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Run one publish cycle.
    pub async fn publish_cycle(&self) -> CycleOutcome {
        let channel_id = self.channel.name();
        let _guard = self.state_lock.lock().await;

        let mut state = self.store.load().await;

        let items = match source::read(&self.source) {
            Ok(items) => items,
            Err(e) => {
                error!(channel = channel_id, "Skipping cycle: {}", e);
                return CycleOutcome::SourceUnavailable;
            }
        };
        if items.is_empty() {
            warn!(
                channel = channel_id,
                "Content source is empty: {}",
                self.source.display()
            );
        }

        let selection = select_next(&items, state.channel_mut(channel_id), self.on_empty);

        let item = match selection.item {
            Some(item) => item,
            None => {
                if selection.looped {
                    self.persist(&state).await;
                }
                info!(channel = channel_id, "Nothing to post");
                return CycleOutcome::NothingToPost;
            }
        };

        info!(
            channel = channel_id,
            index = item.index,
            category = %item.category,
            "Selected post"
        );

        let text = match self
            .channel
            .character_limit()
            .and_then(|limit| truncate_to_limit(&item.text, limit).map(|t| (limit, t)))
        {
            Some((limit, truncated)) => {
                warn!(
                    channel = channel_id,
                    index = item.index,
                    "Text exceeds {} chars ({}). Truncating.",
                    limit,
                    item.text.chars().count()
                );
                truncated
            }
            None => item.text.clone(),
        };

        let result = match tokio::time::timeout(self.timeout, self.channel.deliver(&item, &text)).await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(format!(
                "no response within {}s",
                self.timeout.as_secs_f64()
            ))),
        };

        match result {
            Ok(delivery) => {
                info!(channel = channel_id, index = item.index, "Posted successfully");
                let extra = delivery.extra;
                if let Err(e) = self
                    .store
                    .commit(&mut state, channel_id, item.index, &item.category, extra.clone())
                    .await
                {
                    error!(
                        channel = channel_id,
                        index = item.index,
                        "Posted but failed to record state, item may be posted again: {}",
                        e
                    );
                }
                CycleOutcome::Posted {
                    index: item.index,
                    extra,
                }
            }
            Err(e) => {
                if e.is_recoverable() {
                    warn!(
                        channel = channel_id,
                        index = item.index,
                        "Delivery failed, will retry next cycle: {}",
                        e
                    );
                } else {
                    error!(
                        channel = channel_id,
                        index = item.index,
                        "Delivery failed permanently, check configuration: {}",
                        e
                    );
                }
                // Keep a loop-reset from selection even though nothing was posted.
                self.persist(&state).await;
                CycleOutcome::Failed {
                    index: item.index,
                    error: e,
                }
            }
        }
    }

    async fn persist(&self, state: &PostingStateFile) {
        if let Err(e) = self.store.save(state).await {
            error!(
                channel = self.channel.name(),
                "Failed to save state, next cycle may repeat a post: {}",
                e
            );
        }
    }
}
