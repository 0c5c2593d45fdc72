//! Posting state persistence
//!
//! The [`StateStore`] trait is the only way posting state reaches durable
//! storage. [`JsonStateStore`] keeps everything in one JSON file that is
//! replaced atomically on every save; [`MemoryStateStore`] keeps it in memory
//! for tests and embedding.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::StateError;
use crate::types::PostingStateFile;

/// Durable storage for [`PostingStateFile`]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the full posting state.
    ///
    /// Never fails: a missing or corrupt backing resource yields the default
    /// (empty) state. Losing history risks one duplicate post, which is
    /// preferable to refusing to post at all.
    async fn load(&self) -> PostingStateFile;

    /// Replace the stored state with `state`.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the write cannot complete. Callers log the
    /// failure and carry on.
    async fn save(&self, state: &PostingStateFile) -> Result<(), StateError>;

    /// Record a confirmed post on `channel_id` and persist the result.
    async fn commit(
        &self,
        state: &mut PostingStateFile,
        channel_id: &str,
        index: usize,
        category: &str,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), StateError> {
        state
            .channel_mut(channel_id)
            .record(index, category, extra, Utc::now());
        self.save(state).await?;
        info!(channel = channel_id, index, "Marked post as posted");
        Ok(())
    }
}

/// State store backed by a single JSON file
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_error(&self, source: std::io::Error) -> StateError {
        StateError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> PostingStateFile {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting fresh", self.path.display());
                return PostingStateFile::default();
            }
            Err(e) => {
                warn!(
                    "Unreadable state file {}, using defaults: {}",
                    self.path.display(),
                    e
                );
                return PostingStateFile::default();
            }
        };

        match serde_json::from_str::<PostingStateFile>(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Corrupted state file {}, using defaults: {}",
                    self.path.display(),
                    e
                );
                PostingStateFile::default()
            }
        }
    }

    async fn save(&self, state: &PostingStateFile) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.write_error(e))?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;

        // Write the whole file next to the target, then swap it in, so a
        // crash mid-write never leaves a truncated state file.
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| self.write_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o644);
            tokio::fs::set_permissions(&temp_path, permissions)
                .await
                .map_err(|e| self.write_error(e))?;
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(self.write_error(e));
        }

        debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

/// In-memory state store
///
/// Can be told to fail every save, which exercises the publisher's
/// persistence-failure path.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<PostingStateFile>,
    fail_saves: AtomicBool,
    save_count: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state
    pub fn with_state(state: PostingStateFile) -> Self {
        Self {
            state: Mutex::new(state),
            ..Default::default()
        }
    }

    /// Make every subsequent save fail (or succeed again)
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Copy of the currently stored state
    pub fn snapshot(&self) -> PostingStateFile {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> PostingStateFile {
        self.snapshot()
    }

    async fn save(&self, state: &PostingStateFile) -> Result<(), StateError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StateError::Write {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "saves disabled"),
            });
        }

        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state.clone();
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MAX_HISTORY;
    use tempfile::TempDir;

    fn extra(key: &str, value: &str) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        map
    }

    #[tokio::test]
    async fn test_missing_file_loads_default() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(temp_dir.path().join("state.json"));

        let state = store.load().await;
        assert_eq!(state, PostingStateFile::default());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonStateStore::new(&path);
        assert_eq!(store.load().await, PostingStateFile::default());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(temp_dir.path().join("nested").join("state.json"));

        let mut state = store.load().await;
        store
            .commit(&mut state, "twitter", 3, "goal", extra("tweet_id", "42"))
            .await
            .unwrap();

        let reloaded = store.load().await;
        assert_eq!(reloaded, state);
        let twitter = reloaded.channel("twitter").unwrap();
        assert_eq!(twitter.last_index, Some(3));
        assert_eq!(twitter.last_category.as_deref(), Some("goal"));
        assert_eq!(twitter.history[0].extra.get("tweet_id").unwrap(), "42");
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        let store = JsonStateStore::new(&path);

        store.save(&PostingStateFile::default()).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("state.json")]);
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        let store = JsonStateStore::new(&path);

        let mut state = PostingStateFile::default();
        store
            .commit(&mut state, "discord", 0, "goal", serde_json::Map::new())
            .await
            .unwrap();
        state.channel_mut("discord").reset();
        store.save(&state).await.unwrap();

        let reloaded = store.load().await;
        assert!(reloaded.channel("discord").unwrap().history.is_empty());
    }

    #[tokio::test]
    async fn test_save_into_unwritable_location_fails() {
        let temp_dir = TempDir::new().unwrap();
        // A regular file cannot be a parent directory.
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = JsonStateStore::new(blocker.join("state.json"));

        let result = store.save(&PostingStateFile::default()).await;
        assert!(matches!(result, Err(StateError::Write { .. })));
    }

    #[tokio::test]
    async fn test_channels_are_independent() {
        let store = MemoryStateStore::new();
        let mut state = store.load().await;

        store
            .commit(&mut state, "twitter", 1, "plan", serde_json::Map::new())
            .await
            .unwrap();
        store
            .commit(&mut state, "discord", 5, "goal", serde_json::Map::new())
            .await
            .unwrap();

        let stored = store.snapshot();
        assert_eq!(stored.channel("twitter").unwrap().last_index, Some(1));
        assert_eq!(stored.channel("discord").unwrap().last_index, Some(5));
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_history_bounded_after_many_commits() {
        let store = MemoryStateStore::new();
        let mut state = store.load().await;

        for i in 0..(MAX_HISTORY + 1) {
            store
                .commit(&mut state, "twitter", i, "goal", serde_json::Map::new())
                .await
                .unwrap();
        }

        let snapshot = store.snapshot();
        let history = &snapshot.channel("twitter").unwrap().history;
        assert_eq!(history.len(), MAX_HISTORY);
        let indices: Vec<usize> = history.iter().map(|r| r.index).collect();
        let expected: Vec<usize> = (1..=MAX_HISTORY).collect();
        assert_eq!(indices, expected);
    }

    #[tokio::test]
    async fn test_failing_memory_store() {
        let store = MemoryStateStore::new();
        store.set_fail_saves(true);

        let mut state = store.load().await;
        let result = store
            .commit(&mut state, "twitter", 0, "goal", serde_json::Map::new())
            .await;
        assert!(result.is_err());
        // In-memory copy still reflects the commit; the store does not.
        assert_eq!(state.channel("twitter").unwrap().last_index, Some(0));
        assert_eq!(store.snapshot(), PostingStateFile::default());
    }
}
