use crate::ports::storage::{validate_key, ObjectInfo, StorageError, StoragePort};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Object storage on the local filesystem. Keys map to paths below `root`,
/// which the monolith serves under `public_base_url`.
#[derive(Clone, Debug)]
pub struct FsAdapter {
    root: PathBuf,
    public_base_url: String,
}

impl FsAdapter {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StoragePort for FsAdapter {
    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let dest = self.path_for(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Readers never observe a half-written object
        let partial = dest.with_file_name(format!(".partial-{}", Uuid::new_v4()));
        if let Err(e) = tokio::fs::copy(local_path, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&partial, &dest).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectInfo {
                size_bytes: meta.len(),
                content_type: mime_guess::from_path(&path)
                    .first()
                    .map(|m| m.essence_str().to_string()),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    async fn share_url(&self, key: &str, _ttl: Duration) -> Result<String, StorageError> {
        validate_key(key)?;
        Ok(self.public_url(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    fn source(contents: &[u8]) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        file
    }

    #[tokio::test]
    async fn test_upload_head_delete() {
        let root = tempdir().unwrap();
        let fs = FsAdapter::new(root.path(), "http://localhost:3000/files/");
        let file = source(b"0123456789");

        fs.upload(file.path(), "artifacts/job-1/output.mp4", "video/mp4")
            .await
            .unwrap();

        let info = fs.head("artifacts/job-1/output.mp4").await.unwrap().unwrap();
        assert_eq!(info.size_bytes, 10);
        assert_eq!(info.content_type.as_deref(), Some("video/mp4"));
        assert_eq!(
            fs.public_url("artifacts/job-1/output.mp4"),
            "http://localhost:3000/files/artifacts/job-1/output.mp4"
        );

        fs.delete("artifacts/job-1/output.mp4").await.unwrap();
        assert!(fs.head("artifacts/job-1/output.mp4").await.unwrap().is_none());
        // Deleting twice is fine
        fs.delete("artifacts/job-1/output.mp4").await.unwrap();
    }

    #[tokio::test]
    async fn test_no_partial_files_left_behind() {
        let root = tempdir().unwrap();
        let fs = FsAdapter::new(root.path(), "http://localhost/files");
        let file = source(b"video");

        fs.upload(file.path(), "staging/a/source.mp4", "video/mp4")
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(root.path().join("staging/a"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["source.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let root = tempdir().unwrap();
        let fs = FsAdapter::new(root.path(), "http://localhost/files");
        let file = source(b"x");

        let err = fs.upload(file.path(), "../escape.mp4", "video/mp4").await;
        assert!(matches!(err, Err(StorageError::InvalidKey(_))));
        assert!(fs.head("/etc/passwd").await.is_err());
    }
}
