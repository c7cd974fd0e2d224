//! Where suspended messages wait to be resumed.

use super::Continuation;
use crate::errors::SoapflowError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const EXTENSION: &str = "continuation";

/// Keeps continuations keyed by log correlation id.
#[async_trait]
pub trait ContinuationStore: Send + Sync {
    /// Stores `continuation`, replacing any with the same id.
    async fn save(&self, continuation: &Continuation) -> Result<(), SoapflowError>;

    /// Loads a continuation.
    async fn load(&self, log_correlation_id: &str) -> Result<Option<Continuation>, SoapflowError>;

    /// Deletes a continuation. Returns true if one existed.
    async fn remove(&self, log_correlation_id: &str) -> Result<bool, SoapflowError>;

    /// Ids of every stored continuation, sorted.
    async fn ids(&self) -> Result<Vec<String>, SoapflowError>;

    /// Loads and deletes a continuation.
    async fn take(&self, log_correlation_id: &str) -> Result<Option<Continuation>, SoapflowError> {
        let continuation = self.load(log_correlation_id).await?;
        if continuation.is_some() {
            self.remove(log_correlation_id).await?;
        }
        Ok(continuation)
    }
}

/// A process-local store.
#[derive(Debug, Default)]
pub struct InMemoryContinuationStore {
    entries: DashMap<String, Continuation>,
}

impl InMemoryContinuationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored continuations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ContinuationStore for InMemoryContinuationStore {
    async fn save(&self, continuation: &Continuation) -> Result<(), SoapflowError> {
        self.entries
            .insert(continuation.log_correlation_id().to_string(), continuation.clone());
        Ok(())
    }

    async fn load(&self, log_correlation_id: &str) -> Result<Option<Continuation>, SoapflowError> {
        Ok(self.entries.get(log_correlation_id).map(|c| c.value().clone()))
    }

    async fn remove(&self, log_correlation_id: &str) -> Result<bool, SoapflowError> {
        Ok(self.entries.remove(log_correlation_id).is_some())
    }

    async fn ids(&self) -> Result<Vec<String>, SoapflowError> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

/// Stores each continuation as a token file named after its log
/// correlation id. Writes go to a temporary file first and are renamed
/// into place.
#[derive(Debug, Clone)]
pub struct FileContinuationStore {
    dir: PathBuf,
}

impl FileContinuationStore {
    /// Uses `dir`, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, SoapflowError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "Opened continuation store");
        Ok(Self { dir })
    }

    /// The store's directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, log_correlation_id: &str) -> Result<PathBuf, SoapflowError> {
        let valid = !log_correlation_id.is_empty()
            && log_correlation_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SoapflowError::Internal(format!(
                "'{log_correlation_id}' cannot be used as a continuation file name"
            )));
        }
        Ok(self.dir.join(format!("{log_correlation_id}.{EXTENSION}")))
    }
}

#[async_trait]
impl ContinuationStore for FileContinuationStore {
    async fn save(&self, continuation: &Continuation) -> Result<(), SoapflowError> {
        let path = self.path_for(continuation.log_correlation_id())?;
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, continuation.encode()?).await?;
        fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "Saved continuation");
        Ok(())
    }

    async fn load(&self, log_correlation_id: &str) -> Result<Option<Continuation>, SoapflowError> {
        let path = self.path_for(log_correlation_id)?;
        match fs::read_to_string(&path).await {
            Ok(token) => Continuation::decode(&token).map(Some),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn remove(&self, log_correlation_id: &str) -> Result<bool, SoapflowError> {
        let path = self.path_for(log_correlation_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn ids(&self) -> Result<Vec<String>, SoapflowError> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => ids.push(stem.to_string()),
                None => warn!(path = %path.display(), "Skipping unreadable continuation file name"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Flow;
    use crate::testing::EngineFixture;
    use pretty_assertions::assert_eq;

    fn continuation() -> Continuation {
        let fixture = EngineFixture::echo();
        let msg = fixture.request(crate::testing::ECHO_ACTION);
        msg.set_flow(Flow::In);
        Continuation::capture(&msg).unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_save_load_take() {
        let store = InMemoryContinuationStore::new();
        let c = continuation();
        store.save(&c).await.unwrap();

        assert_eq!(store.ids().await.unwrap(), vec![c.log_correlation_id().to_string()]);
        assert_eq!(store.load(c.log_correlation_id()).await.unwrap(), Some(c.clone()));
        assert_eq!(store.take(c.log_correlation_id()).await.unwrap(), Some(c.clone()));
        assert!(store.is_empty());
        assert!(!store.remove(c.log_correlation_id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_keeps_one_file_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileContinuationStore::open(dir.path().join("pending")).await.unwrap();
        let first = continuation();
        let second = continuation();
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();
        store.save(&first).await.unwrap();

        let mut expected = vec![
            first.log_correlation_id().to_string(),
            second.log_correlation_id().to_string(),
        ];
        expected.sort();
        assert_eq!(store.ids().await.unwrap(), expected);
        assert_eq!(store.load(first.log_correlation_id()).await.unwrap(), Some(first.clone()));
    }

    #[tokio::test]
    async fn test_file_store_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileContinuationStore::open(dir.path()).await.unwrap();

        assert_eq!(store.load("absent").await.unwrap(), None);
        assert!(!store.remove("absent").await.unwrap());
        assert_eq!(store.take("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileContinuationStore::open(dir.path()).await.unwrap();

        assert!(store.load("../etc/passwd").await.is_err());
    }

    #[test]
    fn test_file_store_can_be_driven_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let c = continuation();
        let loaded = tokio_test::block_on(async {
            let store = FileContinuationStore::open(dir.path()).await.unwrap();
            store.save(&c).await.unwrap();
            store.take(c.log_correlation_id()).await.unwrap()
        });
        assert_eq!(loaded, Some(c));
    }
}
