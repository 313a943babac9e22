//! Rating book persistence
//!
//! The book is stored as one JSON snapshot. File storage writes to a
//! sibling temporary file and renames it over the target so a crash never
//! leaves a truncated snapshot behind.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

use crate::game::book::RatingBook;

/// Trait for rating book storage operations
#[async_trait]
pub trait BookStorage: Send + Sync {
    /// Load the stored book, if any
    async fn load(&self) -> Result<Option<RatingBook>>;

    /// Replace the stored book
    async fn save(&self, book: &RatingBook) -> Result<()>;
}

/// JSON snapshot on the local filesystem
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
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
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl BookStorage for JsonFileStorage {
    async fn load(&self) -> Result<Option<RatingBook>> {
        if !tokio::fs::try_exists(&self.path)
            .await
            .with_context(|| format!("Failed to check {}", self.path.display()))?
        {
            debug!("No snapshot at {}", self.path.display());
            return Ok(None);
        }

        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", self.path.display()))?;
        let book: RatingBook = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse snapshot {}", self.path.display()))?;

        info!("Loaded rating book from {}", self.path.display());
        Ok(Some(book))
    }

    async fn save(&self, book: &RatingBook) -> Result<()> {
        let json = serde_json::to_string_pretty(book).context("Failed to serialize rating book")?;
        let temp = self.temp_path();

        tokio::fs::write(&temp, json)
            .await
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!("Saved rating book to {}", self.path.display());
        Ok(())
    }
}

/// In-memory storage that still round-trips through JSON
#[derive(Debug, Default)]
pub struct InMemoryBookStorage {
    snapshot: RwLock<Option<String>>,
}

impl InMemoryBookStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl BookStorage for InMemoryBookStorage {
    async fn load(&self) -> Result<Option<RatingBook>> {
        let snapshot = self
            .snapshot
            .read()
            .map_err(|_| anyhow!("Failed to acquire snapshot read lock"))?;

        snapshot
            .as_deref()
            .map(|raw| serde_json::from_str(raw).context("Failed to parse stored snapshot"))
            .transpose()
    }

    async fn save(&self, book: &RatingBook) -> Result<()> {
        let json = serde_json::to_string(book).context("Failed to serialize rating book")?;
        let mut snapshot = self
            .snapshot
            .write()
            .map_err(|_| anyhow!("Failed to acquire snapshot write lock"))?;
        *snapshot = Some(json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContextPolicy;
    use chrono::Utc;

    fn sample_book() -> RatingBook {
        let mut book = RatingBook::new(1000);
        book.register_context("guild", ContextPolicy::default())
            .unwrap();
        book.register_member("alice", "alice", "guild", Utc::now())
            .unwrap();
        book
    }

    #[tokio::test]
    async fn test_file_storage_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("book.json"));
        assert!(storage.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("book.json"));

        storage.save(&sample_book()).await.unwrap();
        let loaded = storage.load().await.unwrap().unwrap();
        assert!(loaded.member("alice").is_ok());
        assert!(!storage.temp_path().exists());
    }

    #[tokio::test]
    async fn test_file_storage_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.json");
        std::fs::write(&path, "not json").unwrap();

        let storage = JsonFileStorage::new(path);
        let err = storage.load().await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse snapshot"));
    }

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = InMemoryBookStorage::new();
        assert!(storage.load().await.unwrap().is_none());

        storage.save(&sample_book()).await.unwrap();
        assert!(storage.has_snapshot());
        let loaded = storage.load().await.unwrap().unwrap();
        assert!(loaded.context("guild").is_ok());
    }
}
