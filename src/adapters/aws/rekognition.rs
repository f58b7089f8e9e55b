use crate::domain::jobs::ModerationLabel;
use crate::ports::moderation::{ClassifierError, ContentClassifier, StagedSource};
use async_trait::async_trait;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::types::{ContentModerationDetection, S3Object, Video, VideoJobStatus};
use aws_sdk_rekognition::Client;
use std::time::Duration;

/// Video moderation through Rekognition's asynchronous content moderation
/// API on the staged S3 object. The caller bounds the total wait.
#[derive(Clone)]
pub struct RekognitionClassifier {
    client: Client,
    bucket: String,
    min_confidence: f32,
    poll_interval: Duration,
}

impl RekognitionClassifier {
    pub fn new(client: Client, bucket: String, min_confidence: f32, poll_interval: Duration) -> Self {
        Self {
            client,
            bucket,
            min_confidence,
            poll_interval,
        }
    }

    async fn start(&self, key: &str) -> Result<String, ClassifierError> {
        let s3_object = S3Object::builder().bucket(&self.bucket).name(key).build();
        let video = Video::builder().s3_object(s3_object).build();

        let response = self
            .client
            .start_content_moderation()
            .video(video)
            .min_confidence(self.min_confidence)
            .send()
            .await
            .map_err(|e| ClassifierError::Unavailable(DisplayErrorContext(e).to_string()))?;

        response
            .job_id()
            .map(String::from)
            .ok_or_else(|| ClassifierError::InvalidResponse("no job id returned".to_string()))
    }

    /// Returns `None` while the analysis is still running.
    async fn results(&self, job_id: &str) -> Result<Option<Vec<ModerationLabel>>, ClassifierError> {
        let mut labels = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .get_content_moderation()
                .job_id(job_id)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| ClassifierError::Unavailable(DisplayErrorContext(e).to_string()))?;

            match response.job_status() {
                Some(VideoJobStatus::InProgress) => return Ok(None),
                Some(VideoJobStatus::Failed) => {
                    return Err(ClassifierError::Failed(
                        response
                            .status_message()
                            .unwrap_or("moderation job failed")
                            .to_string(),
                    ));
                }
                Some(VideoJobStatus::Succeeded) => {}
                other => {
                    return Err(ClassifierError::InvalidResponse(format!(
                        "unexpected job status {:?}",
                        other
                    )));
                }
            }

            labels.extend(response.moderation_labels().iter().filter_map(to_label));

            match response.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => return Ok(Some(labels)),
            }
        }
    }
}

fn to_label(detection: &ContentModerationDetection) -> Option<ModerationLabel> {
    let label = detection.moderation_label()?;
    Some(ModerationLabel {
        name: label.name()?.to_string(),
        parent: label
            .parent_name()
            .filter(|p| !p.is_empty())
            .map(String::from),
        confidence: label.confidence().unwrap_or(0.0),
    })
}

#[async_trait]
impl ContentClassifier for RekognitionClassifier {
    async fn classify(&self, staged: &StagedSource) -> Result<Vec<ModerationLabel>, ClassifierError> {
        let moderation_job = self.start(&staged.source.key).await?;
        tracing::debug!(job_id = %staged.job_id, moderation_job = %moderation_job, "Started content moderation");

        loop {
            if let Some(labels) = self.results(&moderation_job).await? {
                tracing::debug!(job_id = %staged.job_id, labels = labels.len(), "Content moderation finished");
                return Ok(labels);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
