//! Rotacast - scheduled rotating posts for Twitter/X and Discord
//!
//! This library reads content items from CSV files, picks the next item for
//! each channel (rotating through everything before repeating and avoiding
//! back-to-back categories), delivers it, and records what was posted in a
//! small JSON state file.

pub mod channels;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod publisher;
pub mod rotation;
pub mod scheduling;
pub mod source;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use channels::{Channel, Delivery};
pub use config::{ChannelKind, Config};
pub use error::{DeliveryError, Result, RotacastError};
pub use publisher::{ChannelPublisher, CycleOutcome};
pub use rotation::{select_next, Selection};
pub use scheduling::{Schedule, Scheduler};
pub use state::{JsonStateStore, MemoryStateStore, StateStore};
pub use types::{ChannelPostingState, ContentItem, OnEmpty, PostRecord, PostingStateFile};
