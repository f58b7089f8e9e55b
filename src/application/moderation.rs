use crate::application::error::PipelineError;
use crate::config::PipelineConfig;
use crate::domain::jobs::{Job, ModerationVerdict};
use crate::domain::policy::{validate_labels, Decision};
use crate::ports::moderation::{ContentClassifier, ModerationDecider, StagedSource};
use crate::ports::storage::StoragePort;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Moderation gate: classifier, then decision function, bounded in time and
/// retried a fixed number of times.
pub struct ModerationGate {
    classifier: Arc<dyn ContentClassifier>,
    decider: Arc<dyn ModerationDecider>,
    storage: Arc<dyn StoragePort>,
    config: Arc<PipelineConfig>,
}

impl ModerationGate {
    pub fn new(
        classifier: Arc<dyn ContentClassifier>,
        decider: Arc<dyn ModerationDecider>,
        storage: Arc<dyn StoragePort>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            classifier,
            decider,
            storage,
            config,
        }
    }

    pub async fn evaluate(&self, job: &Job) -> Result<ModerationVerdict, PipelineError> {
        let share_url = self
            .storage
            .share_url(&job.source.key, self.config.share_url_ttl)
            .await?;
        let staged = StagedSource {
            job_id: job.id,
            source: job.source.clone(),
            share_url,
        };

        let attempts = self.config.moderation_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.config.moderation_timeout, self.attempt(&staged)).await
            {
                Ok(Ok(decision)) => {
                    tracing::info!(
                        job_id = %job.id,
                        attempt,
                        approved = decision.approved,
                        flagged = ?decision.flagged_categories,
                        "Moderation verdict"
                    );
                    return Ok(ModerationVerdict {
                        job_id: job.id,
                        approved: decision.approved,
                        flagged_categories: decision.flagged_categories,
                        decided_at: Utc::now(),
                    });
                }
                Ok(Err(reason)) => {
                    tracing::warn!(job_id = %job.id, attempt, %reason, "Moderation attempt failed");
                    last_error = reason;
                }
                Err(_) => {
                    tracing::warn!(job_id = %job.id, attempt, "Moderation attempt timed out");
                    last_error = format!(
                        "no verdict within {}s",
                        self.config.moderation_timeout.as_secs()
                    );
                }
            }

            if attempt < attempts {
                tokio::time::sleep(backoff(self.config.moderation_backoff, attempt)).await;
            }
        }

        Err(PipelineError::Moderation {
            attempts,
            reason: last_error,
        })
    }

    async fn attempt(&self, staged: &StagedSource) -> Result<Decision, String> {
        let labels = self
            .classifier
            .classify(staged)
            .await
            .map_err(|e| e.to_string())?;
        validate_labels(&labels)
            .map_err(|e| format!("classifier returned an invalid response: {}", e))?;

        let decision = self
            .decider
            .decide(staged.job_id, &labels)
            .await
            .map_err(|e| e.to_string())?;
        Ok(decision.normalized())
    }
}

/// Linear backoff, saturating for configured delays that would overflow.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(attempt).unwrap_or(Duration::MAX)
}
