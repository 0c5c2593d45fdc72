//! Core types for Rotacast

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Number of post records kept per channel. Older entries are evicted first.
pub const MAX_HISTORY: usize = 500;

/// One row of the content source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    /// 0-based position among the successfully parsed rows
    pub index: usize,
    /// Post body, whitespace-trimmed
    pub text: String,
    /// Category, trimmed and lowercased
    pub category: String,
}

impl ContentItem {
    pub fn new(index: usize, text: &str, category: &str) -> Self {
        Self {
            index,
            text: text.trim().to_string(),
            category: category.trim().to_lowercase(),
        }
    }
}

/// What to do once every item has been posted on a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnEmpty {
    /// Clear the history and start the rotation again
    #[default]
    Loop,
    /// Post nothing until new items are added
    Stop,
}

impl FromStr for OnEmpty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "loop" => Ok(OnEmpty::Loop),
            "stop" => Ok(OnEmpty::Stop),
            _ => Err(format!(
                "Invalid on_empty policy: '{}'. Valid options: loop, stop",
                s
            )),
        }
    }
}

impl fmt::Display for OnEmpty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnEmpty::Loop => write!(f, "loop"),
            OnEmpty::Stop => write!(f, "stop"),
        }
    }
}

/// A confirmed post, as recorded in a channel's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub index: usize,
    pub posted_at: DateTime<Utc>,
    /// Channel-specific metadata such as the remote message id
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Posting state for a single channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelPostingState {
    #[serde(default, deserialize_with = "legacy_index")]
    pub last_index: Option<usize>,
    #[serde(default)]
    pub last_category: Option<String>,
    #[serde(default)]
    pub history: Vec<PostRecord>,
}

impl ChannelPostingState {
    /// Forget everything posted so the rotation starts over.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_index = None;
        self.last_category = None;
    }

    /// Append a post record and evict the oldest entries beyond [`MAX_HISTORY`].
    pub fn record(
        &mut self,
        index: usize,
        category: &str,
        extra: serde_json::Map<String, serde_json::Value>,
        posted_at: DateTime<Utc>,
    ) {
        self.history.push(PostRecord {
            index,
            posted_at,
            extra,
        });
        self.last_index = Some(index);
        self.last_category = Some(category.to_string());

        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }
}

/// Posting state of every channel, keyed by channel id.
///
/// This is the whole durable record of what has been published; it is loaded
/// and saved as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostingStateFile {
    pub channels: BTreeMap<String, ChannelPostingState>,
}

impl PostingStateFile {
    /// State for `channel_id`, if the channel has ever been seen
    pub fn channel(&self, channel_id: &str) -> Option<&ChannelPostingState> {
        self.channels.get(channel_id)
    }

    /// State for `channel_id`, created with initial values if absent
    pub fn channel_mut(&mut self, channel_id: &str) -> &mut ChannelPostingState {
        self.channels.entry(channel_id.to_string()).or_default()
    }
}

/// Older state files stored "nothing posted yet" as `-1`.
fn legacy_index<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.and_then(|i| usize::try_from(i).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_item_normalizes_fields() {
        let item = ContentItem::new(0, "  Ship it  ", " GOAL ");
        assert_eq!(item.text, "Ship it");
        assert_eq!(item.category, "goal");
    }

    #[test]
    fn test_on_empty_from_str() {
        assert_eq!("loop".parse::<OnEmpty>().unwrap(), OnEmpty::Loop);
        assert_eq!("STOP".parse::<OnEmpty>().unwrap(), OnEmpty::Stop);
        assert!("forever".parse::<OnEmpty>().is_err());
        assert_eq!(OnEmpty::default(), OnEmpty::Loop);
    }

    #[test]
    fn test_record_updates_last_fields() {
        let mut state = ChannelPostingState::default();
        state.record(4, "plan", serde_json::Map::new(), Utc::now());

        assert_eq!(state.last_index, Some(4));
        assert_eq!(state.last_category.as_deref(), Some("plan"));
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].index, 4);
    }

    #[test]
    fn test_record_bounds_history() {
        let mut state = ChannelPostingState::default();
        for i in 0..(MAX_HISTORY + 1) {
            state.record(i, "goal", serde_json::Map::new(), Utc::now());
        }

        assert_eq!(state.history.len(), MAX_HISTORY);
        assert_eq!(state.history.first().unwrap().index, 1);
        assert_eq!(state.history.last().unwrap().index, MAX_HISTORY);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = ChannelPostingState::default();
        state.record(0, "goal", serde_json::Map::new(), Utc::now());
        state.reset();
        assert_eq!(state, ChannelPostingState::default());
    }

    #[test]
    fn test_legacy_minus_one_index_loads_as_none() {
        let json = r#"{"twitter": {"last_index": -1, "last_category": null, "history": []}}"#;
        let file: PostingStateFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.channel("twitter").unwrap().last_index, None);
    }

    #[test]
    fn test_extra_fields_are_flattened() {
        let json = r#"{
            "twitter": {
                "last_index": 2,
                "last_category": "goal",
                "history": [{"index": 2, "posted_at": "2026-01-01T09:00:00+00:00", "tweet_id": "123"}]
            }
        }"#;
        let file: PostingStateFile = serde_json::from_str(json).unwrap();
        let record = &file.channel("twitter").unwrap().history[0];
        assert_eq!(record.extra.get("tweet_id").unwrap(), "123");

        let out = serde_json::to_value(&file).unwrap();
        assert_eq!(out["twitter"]["history"][0]["tweet_id"], "123");
        assert_eq!(out["twitter"]["last_index"], 2);
    }

    #[test]
    fn test_channel_mut_inserts_initial_state() {
        let mut file = PostingStateFile::default();
        assert!(file.channel("discord").is_none());
        file.channel_mut("discord");
        assert_eq!(
            file.channel("discord"),
            Some(&ChannelPostingState::default())
        );
    }
}
