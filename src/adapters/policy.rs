use crate::domain::jobs::{JobId, ModerationLabel};
use crate::domain::policy::{Decision, ThresholdPolicy};
use crate::ports::moderation::{DecisionError, ModerationDecider};
use async_trait::async_trait;

/// In-process decision function used when no remote one is configured.
#[async_trait]
impl ModerationDecider for ThresholdPolicy {
    async fn decide(
        &self,
        job_id: JobId,
        labels: &[ModerationLabel],
    ) -> Result<Decision, DecisionError> {
        let decision = ThresholdPolicy::decide(self, labels);
        tracing::debug!(job_id = %job_id, labels = labels.len(), approved = decision.approved, "Local moderation policy");
        Ok(decision)
    }
}
