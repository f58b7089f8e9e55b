use super::http_client;
use crate::domain::jobs::{JobId, ModerationLabel};
use crate::ports::moderation::{ClassifierError, ContentClassifier, StagedSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    job_id: JobId,
    video_url: &'a str,
    content_type: &'a str,
    file_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    labels: Vec<LabelDto>,
}

#[derive(Debug, Deserialize)]
struct LabelDto {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    confidence: f32,
}

/// Content classifier reached over HTTP. The service reads the staged
/// video through its share URL and answers with moderation labels.
#[derive(Clone)]
pub struct HttpClassifier {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: String) -> Result<Self, ClassifierError> {
        let http = http_client().map_err(|e| ClassifierError::Unavailable(e.to_string()))?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl ContentClassifier for HttpClassifier {
    async fn classify(&self, staged: &StagedSource) -> Result<Vec<ModerationLabel>, ClassifierError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&ClassifyRequest {
                job_id: staged.job_id,
                video_url: &staged.share_url,
                content_type: &staged.source.content_type,
                file_name: &staged.source.file_name,
            })
            .send()
            .await
            .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ClassifierError::Unavailable(status.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Failed(format!("{} - {}", status, body.trim())));
        }

        let body: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;
        Ok(body
            .labels
            .into_iter()
            .map(|l| ModerationLabel {
                name: l.name,
                parent: l.parent.filter(|p| !p.trim().is_empty()),
                confidence: l.confidence,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::SourceRef;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn staged() -> StagedSource {
        StagedSource {
            job_id: JobId::new(),
            source: SourceRef {
                key: "staging/1/source.mp4".to_string(),
                file_name: "clip.mp4".to_string(),
                content_type: "video/mp4".to_string(),
                size_bytes: 1024,
            },
            share_url: "http://localhost:3000/files/staging/1/source.mp4".to_string(),
        }
    }

    #[tokio::test]
    async fn test_labels_are_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .and(body_partial_json(json!({
                "video_url": "http://localhost:3000/files/staging/1/source.mp4",
                "content_type": "video/mp4"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "labels": [
                    {"name": "Graphic Violence", "parent": "Violence", "confidence": 91.5},
                    {"name": "Smoking", "parent": "", "confidence": 55.0}
                ]
            })))
            .mount(&server)
            .await;

        let classifier = HttpClassifier::new(format!("{}/classify", server.uri())).unwrap();
        let labels = classifier.classify(&staged()).await.unwrap();

        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].category(), "Violence");
        assert_eq!(labels[1].parent, None);
    }

    #[tokio::test]
    async fn test_server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let classifier = HttpClassifier::new(server.uri()).unwrap();
        assert!(matches!(
            classifier.classify(&staged()).await,
            Err(ClassifierError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"verdict": "ok"})))
            .mount(&server)
            .await;

        let classifier = HttpClassifier::new(server.uri()).unwrap();
        assert!(matches!(
            classifier.classify(&staged()).await,
            Err(ClassifierError::InvalidResponse(_))
        ));
    }
}
