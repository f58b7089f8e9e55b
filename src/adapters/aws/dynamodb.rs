use crate::domain::jobs::{Job, JobId, JobStage};
use crate::ports::repository::{JobRepository, RepositoryError};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;

/// DynamoAdapter implements JobRepository for AWS DynamoDB.
///
/// Items are keyed by `job_id`; `stage` is kept as a top-level attribute
/// next to the JSON `payload` so saves can be conditional on it.
#[derive(Clone)]
pub struct DynamoAdapter {
    client: Client,
    table_name: String,
}

impl DynamoAdapter {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

fn backend<E: std::error::Error>(err: E) -> RepositoryError {
    RepositoryError::Backend(DisplayErrorContext(err).to_string())
}

fn item_values(job: &Job) -> Result<[(String, AttributeValue); 3], RepositoryError> {
    Ok([
        ("job_id".to_string(), AttributeValue::S(job.id.to_string())),
        (
            "stage".to_string(),
            AttributeValue::S(job.stage.as_str().to_string()),
        ),
        (
            "payload".to_string(),
            AttributeValue::S(serde_json::to_string(job)?),
        ),
    ])
}

#[async_trait]
impl JobRepository for DynamoAdapter {
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .condition_expression("attribute_not_exists(job_id)");
        for (name, value) in item_values(job)? {
            request = request.item(name, value);
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Err(RepositoryError::Duplicate(job.id))
            }
            Err(err) => Err(backend(err)),
        }
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("job_id", AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(backend)?;

        let Some(item) = resp.item else {
            return Ok(None);
        };
        let payload = item
            .get("payload")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| RepositoryError::Backend(format!("job {} has no payload", id)))?;
        Ok(Some(serde_json::from_str(payload)?))
    }

    async fn save_if(&self, job: &Job, expected: JobStage) -> Result<bool, RepositoryError> {
        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .condition_expression("#stage = :expected")
            .expression_attribute_names("#stage", "stage")
            .expression_attribute_values(":expected", AttributeValue::S(expected.as_str().to_string()));
        for (name, value) in item_values(job)? {
            request = request.item(name, value);
        }

        match request.send().await {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(err) => Err(backend(err)),
        }
    }
}
