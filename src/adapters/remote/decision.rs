use super::http_client;
use crate::domain::jobs::{JobId, ModerationLabel};
use crate::domain::policy::Decision;
use crate::ports::moderation::{DecisionError, ModerationDecider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct DecisionRequest<'a> {
    job_id: JobId,
    labels: &'a [ModerationLabel],
}

#[derive(Debug, Deserialize)]
struct DecisionResponse {
    approved: bool,
    #[serde(default)]
    flagged_categories: Vec<String>,
}

/// Moderation decision function behind an HTTP endpoint, such as a Lambda
/// function URL.
#[derive(Clone)]
pub struct HttpDecisionFunction {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpDecisionFunction {
    pub fn new(endpoint: String) -> Result<Self, DecisionError> {
        let http = http_client().map_err(|e| DecisionError::Unavailable(e.to_string()))?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl ModerationDecider for HttpDecisionFunction {
    async fn decide(
        &self,
        job_id: JobId,
        labels: &[ModerationLabel],
    ) -> Result<Decision, DecisionError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&DecisionRequest { job_id, labels })
            .send()
            .await
            .map_err(|e| DecisionError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DecisionError::Unavailable(format!("{} - {}", status, body.trim())));
        }

        let body: DecisionResponse = response
            .json()
            .await
            .map_err(|e| DecisionError::InvalidResponse(e.to_string()))?;
        Ok(Decision {
            approved: body.approved,
            flagged_categories: body.flagged_categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_labels_are_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "labels": [{"name": "Violence", "parent": null, "confidence": 97.0}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "approved": false,
                "flagged_categories": ["Violence"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let decider = HttpDecisionFunction::new(server.uri()).unwrap();
        let decision = decider
            .decide(
                JobId::new(),
                &[ModerationLabel {
                    name: "Violence".to_string(),
                    parent: None,
                    confidence: 97.0,
                }],
            )
            .await
            .unwrap();

        assert!(!decision.approved);
        assert_eq!(decision.flagged_categories, vec!["Violence".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_verdict_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let decider = HttpDecisionFunction::new(server.uri()).unwrap();
        assert!(matches!(
            decider.decide(JobId::new(), &[]).await,
            Err(DecisionError::InvalidResponse(_))
        ));
    }
}
