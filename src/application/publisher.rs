use crate::application::dispatcher::GeneratedArtifact;
use crate::application::error::PipelineError;
use crate::domain::jobs::{JobId, SourceRef, StoredArtifact};
use crate::ports::storage::StoragePort;
use chrono::Utc;
use std::sync::Arc;

pub fn artifact_key(job_id: JobId, extension: &str) -> String {
    format!("artifacts/{}/output.{}", job_id, extension)
}

/// Writes generation output to durable storage under the job's own key.
pub struct ResultPublisher {
    storage: Arc<dyn StoragePort>,
}

impl ResultPublisher {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self { storage }
    }

    /// Uploads the artifact and confirms the write with a HEAD. An occupied
    /// key is never overwritten.
    pub async fn publish(
        &self,
        job_id: JobId,
        artifact: &GeneratedArtifact,
    ) -> Result<StoredArtifact, PipelineError> {
        let key = artifact_key(job_id, &artifact.extension);

        if self.storage.head(&key).await?.is_some() {
            return Err(PipelineError::Storage(format!(
                "refusing to overwrite existing object {}",
                key
            )));
        }

        self.storage
            .upload(&artifact.file, &key, &artifact.content_type)
            .await?;

        match self.storage.head(&key).await? {
            Some(info) if info.size_bytes == artifact.size_bytes => {}
            Some(info) => {
                self.discard(&key).await;
                return Err(PipelineError::Storage(format!(
                    "write not confirmed for {}: stored {} of {} bytes",
                    key, info.size_bytes, artifact.size_bytes
                )));
            }
            None => {
                return Err(PipelineError::Storage(format!(
                    "write not confirmed for {}",
                    key
                )));
            }
        }

        tracing::info!(job_id = %job_id, key = %key, size_bytes = artifact.size_bytes, "Published artifact");
        Ok(StoredArtifact {
            url: self.storage.public_url(&key),
            key,
            content_type: artifact.content_type.clone(),
            size_bytes: artifact.size_bytes,
            stored_at: Utc::now(),
        })
    }

    /// Removes an artifact that lost the race against cancellation.
    pub async fn retract(&self, artifact: &StoredArtifact) -> Result<(), PipelineError> {
        self.storage.delete(&artifact.key).await?;
        tracing::info!(key = %artifact.key, "Retracted artifact");
        Ok(())
    }

    /// Deletes the staged upload of a finished job. Missing objects are fine.
    pub async fn release_source(&self, source: &SourceRef) -> Result<(), PipelineError> {
        self.storage.delete(&source.key).await?;
        tracing::debug!(key = %source.key, "Released staged source");
        Ok(())
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            tracing::warn!(key, error = %e, "Failed to remove unconfirmed artifact");
        }
    }
}
