//! Local cache tier: an offline mirror of the acting user's data, one JSON
//! file per user (or guest), ignored once older than its time-to-live.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthSession;
use crate::error::CacheWriteError;
use crate::models::AppState;

/// Default lifetime of a cache entry.
pub const DEFAULT_CACHE_TTL_HOURS: u64 = 24;

/// Cache key for a session: `cache_<userId>` or `cache_guest`.
pub fn cache_key(session: &AuthSession) -> String {
    match session.user_id() {
        Some(user_id) => format!("cache_{}", user_id),
        None => "cache_guest".to_string(),
    }
}

/// What the cache holds for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(flatten)]
    pub state: AppState,
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    pub fn from_state(state: &AppState, timestamp: DateTime<Utc>) -> Self {
        Self {
            state: state.clone(),
            timestamp,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.timestamp > ttl
    }
}

/// Key-value persistence with expiry.
pub trait LocalCache {
    /// Fresh entry for `key`, or `None` when absent or expired.
    fn load(&self, key: &str) -> Result<Option<CacheEntry>>;

    fn store(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheWriteError>;

    /// Returns whether anything was removed.
    fn remove(&self, key: &str) -> Result<bool>;
}

/// Cache backed by a directory of JSON files.
pub struct FileCache {
    cache_dir: PathBuf,
    ttl: Duration,
}

impl FileCache {
    pub fn new(cache_dir: PathBuf, ttl_hours: u64) -> Result<Self> {
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory: {:?}", cache_dir))?;

        // Capped at a century so the duration can't overflow.
        let ttl_hours = ttl_hours.min(876_000) as i64;
        Ok(Self {
            cache_dir,
            ttl: Duration::hours(ttl_hours),
        })
    }

    /// Get default cache location.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quizwhiz")
            .join("cache")
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Encode `key` as a file name. ASCII letters, digits, `_` and `-` are kept;
/// every other byte becomes `%XX`, so distinct keys never share a file.
pub fn file_stem(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

impl LocalCache for FileCache {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {:?}", path))?;
        let entry: CacheEntry = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse cache file: {:?}", path))?;

        if entry.is_expired(Utc::now(), self.ttl) {
            log::info!("Cache entry {} expired at {}", key, entry.timestamp + self.ttl);
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn store(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheWriteError> {
        let path = self.entry_path(key);
        let json = serde_json::to_string_pretty(entry)?;
        fs::write(&path, json).map_err(|source| CacheWriteError::Write { path, source })
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove cache file: {:?}", path))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Flashcard;
    use tempfile::TempDir;

    fn sample_state() -> AppState {
        AppState {
            flashcards: vec![Flashcard::new("Q".into(), "A".into())],
            ..Default::default()
        }
    }

    #[test]
    fn keys_follow_session() {
        assert_eq!(cache_key(&AuthSession::Guest), "cache_guest");
        assert_eq!(
            cache_key(&AuthSession::Authenticated { user_id: "u1".into() }),
            "cache_u1"
        );
    }

    #[test]
    fn stores_and_loads_fresh_entries() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf(), DEFAULT_CACHE_TTL_HOURS).unwrap();
        let entry = CacheEntry::from_state(&sample_state(), Utc::now());

        cache.store("cache_guest", &entry).unwrap();
        let loaded = cache.load("cache_guest").unwrap().unwrap();
        assert_eq!(loaded, entry);
        assert_eq!(loaded.state.flashcards.len(), 1);
    }

    #[test]
    fn expired_entries_are_absent() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf(), 24).unwrap();
        let stale = CacheEntry::from_state(&sample_state(), Utc::now() - Duration::hours(25));

        cache.store("cache_u1", &stale).unwrap();
        assert!(cache.load("cache_u1").unwrap().is_none());
    }

    #[test]
    fn missing_and_removed_entries() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf(), 24).unwrap();
        assert!(cache.load("cache_nobody").unwrap().is_none());
        assert!(!cache.remove("cache_nobody").unwrap());

        let entry = CacheEntry::from_state(&AppState::default(), Utc::now());
        cache.store("cache_guest", &entry).unwrap();
        assert!(cache.remove("cache_guest").unwrap());
        assert!(cache.load("cache_guest").unwrap().is_none());
    }

    #[test]
    fn keys_are_sanitized_into_file_names() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf(), 24).unwrap();
        assert_eq!(
            cache.entry_path("cache_../evil"),
            dir.path().join("cache_%2E%2E%2Fevil.json")
        );
    }

    #[test]
    fn similar_user_ids_get_separate_entries() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf(), 24).unwrap();
        let entry = CacheEntry::from_state(&sample_state(), Utc::now());

        cache.store("cache_ann.lee", &entry).unwrap();
        assert!(cache.load("cache_ann_lee").unwrap().is_none());
        assert!(cache.load("cache_ann%2Elee").unwrap().is_none());
        assert!(!cache.remove("cache_ann_lee").unwrap());
        assert!(cache.load("cache_ann.lee").unwrap().is_some());
    }

    #[test]
    fn write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("gone"), 24).unwrap();
        fs::remove_dir_all(cache.dir()).unwrap();
        let entry = CacheEntry::from_state(&AppState::default(), Utc::now());
        assert!(matches!(
            cache.store("cache_guest", &entry),
            Err(CacheWriteError::Write { .. })
        ));
    }
}
