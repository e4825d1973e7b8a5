use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "fulfillment-api";
const LEGACY_TOKEN_FILE: &str = "auth_access_token.txt";

/// Token store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No token stored")]
    NoToken,
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Trait for access token storage operations
///
/// This abstraction allows easy mocking of token storage in tests.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Saves the access token
    async fn save(&self, token: &str) -> Result<()>;

    /// Loads the stored access token
    async fn load(&self) -> Result<String, StoreError>;
}

/// Resolves `relative` under the storage root
pub fn storage_path(root: &Path, relative: impl AsRef<Path>) -> PathBuf {
    root.join(relative)
}

/// Per-user storage root, `<data dir>/fulfillment-api`
pub fn default_storage_root() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join(APP_DIR))
}

/// Plain-text token file under a storage root
///
/// Reads fall back to the legacy `auth_access_token.txt` when the
/// configured file does not exist yet.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    root: PathBuf,
    file_name: String,
}

impl FileTokenStore {
    /// Creates a token store for `{root}/{file_name}`
    pub fn new(root: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            file_name: file_name.into(),
        }
    }

    /// Path of the token file written by [`TokenStore::save`]
    pub fn path(&self) -> PathBuf {
        storage_path(&self.root, &self.file_name)
    }

    fn legacy_path(&self) -> PathBuf {
        storage_path(&self.root, LEGACY_TOKEN_FILE)
    }

    async fn read_token(path: &Path) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(data) => {
                let token = data.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Storage(
                anyhow::Error::new(e).context(format!("Failed to read {}", path.display())),
            )),
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn save(&self, token: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .context("Failed to create storage directory")?;

        // Write then rename so readers never observe a partial token
        let path = self.path();
        let staging = path.with_extension("txt.tmp");
        tokio::fs::write(&staging, token)
            .await
            .context("Failed to write token file")?;
        tokio::fs::rename(&staging, &path)
            .await
            .context("Failed to replace token file")?;

        Ok(())
    }

    async fn load(&self) -> Result<String, StoreError> {
        if let Some(token) = Self::read_token(&self.path()).await? {
            return Ok(token);
        }

        // Fall back to the pre-prefix file name
        if let Some(token) = Self::read_token(&self.legacy_path()).await? {
            return Ok(token);
        }

        Err(StoreError::NoToken)
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MemoryTokenStore;
    use super::*;

    // === MemoryTokenStore tests ===

    #[tokio::test]
    async fn memory_store_save_and_load() {
        let store = MemoryTokenStore::new();

        store.save("token_123").await.unwrap();

        assert_eq!(store.load().await.unwrap(), "token_123");
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn memory_store_load_empty_returns_error() {
        let store = MemoryTokenStore::new();
        let result = store.load().await;

        assert!(matches!(result, Err(StoreError::NoToken)));
    }

    // === FileTokenStore tests (with temp dirs) ===

    #[tokio::test]
    async fn file_store_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(temp_dir.path(), "access_token.txt");

        store.save("token_123").await.unwrap();

        assert_eq!(store.load().await.unwrap(), "token_123");
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("access_token.txt")).unwrap(),
            "token_123"
        );
    }

    #[tokio::test]
    async fn file_store_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("nested").join("storage");
        let store = FileTokenStore::new(&root, "acme-access_token.txt");

        store.save("token_123").await.unwrap();

        assert!(root.join("acme-access_token.txt").exists());
        assert!(!root.join("acme-access_token.txt.tmp").exists());
    }

    #[tokio::test]
    async fn file_store_overwrites_previous_token() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(temp_dir.path(), "access_token.txt");

        store.save("first").await.unwrap();
        store.save("second").await.unwrap();

        assert_eq!(store.load().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn file_store_load_nonexistent_returns_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(temp_dir.path(), "access_token.txt");

        assert!(matches!(store.load().await, Err(StoreError::NoToken)));
    }

    #[tokio::test]
    async fn file_store_trims_whitespace_and_ignores_empty_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(temp_dir.path(), "access_token.txt");

        std::fs::write(store.path(), "token_123\n").unwrap();
        assert_eq!(store.load().await.unwrap(), "token_123");

        std::fs::write(store.path(), "  \n").unwrap();
        assert!(matches!(store.load().await, Err(StoreError::NoToken)));
    }

    #[tokio::test]
    async fn file_store_falls_back_to_legacy_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("auth_access_token.txt"), "legacy_token").unwrap();

        let store = FileTokenStore::new(temp_dir.path(), "acme-access_token.txt");

        assert_eq!(store.load().await.unwrap(), "legacy_token");

        store.save("fresh_token").await.unwrap();
        assert_eq!(store.load().await.unwrap(), "fresh_token");
    }

    #[test]
    fn storage_path_joins_under_root() {
        assert_eq!(
            storage_path(Path::new("/srv/storage"), "logs"),
            PathBuf::from("/srv/storage/logs")
        );
    }
}
