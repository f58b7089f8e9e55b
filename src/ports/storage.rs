use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size_bytes: u64,
    pub content_type: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Upload a file from a local path to storage
    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Metadata of a stored object, `None` when the key is free
    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>, StorageError>;

    /// Remove an object; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Stable URL under which a published object is served
    fn public_url(&self, key: &str) -> String;

    /// Time-limited URL through which a collaborator can read a staged object
    async fn share_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Keys are relative, slash-separated and never climb out of their prefix.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "..");
    if bad {
        Err(StorageError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(validate_key("staging/1234/source.mp4").is_ok());
        assert!(validate_key("artifacts/1234/output.mp4").is_ok());
    }

    #[test]
    fn test_invalid_keys() {
        for key in ["", "/abs/key", "a/../b", "a//b", "a\\b", "trailing/"] {
            assert!(validate_key(key).is_err(), "{key} should be invalid");
        }
    }
}
