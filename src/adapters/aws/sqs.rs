use crate::domain::jobs::JobId;
use crate::ports::queue::{JobMessage, JobQueuePort, QueueError};
use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client;
use std::time::Duration;

/// Long polling is capped at 20 seconds by SQS.
const MAX_WAIT_SECS: u64 = 20;

/// SqsAdapter implements JobQueuePort for AWS SQS.
#[derive(Clone)]
pub struct SqsAdapter {
    client: Client,
    queue_url: String,
}

impl SqsAdapter {
    pub fn new(client: Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

fn backend<E: std::error::Error>(err: E) -> QueueError {
    QueueError::Backend(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl JobQueuePort for SqsAdapter {
    async fn enqueue_job(&self, id: JobId) -> Result<(), QueueError> {
        let message_body = JobMessage { job_id: id }.encode()?;
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(message_body)
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn dequeue_job(&self, timeout: Duration) -> Result<Option<JobId>, QueueError> {
        let wait_time = timeout.as_secs().min(MAX_WAIT_SECS) as i32;
        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(wait_time)
            .send()
            .await
            .map_err(backend)?;

        let Some(msg) = resp.messages.unwrap_or_default().into_iter().next() else {
            return Ok(None);
        };

        // The job record carries the state; the message is only a wake-up
        if let Some(receipt_handle) = msg.receipt_handle() {
            self.client
                .delete_message()
                .queue_url(&self.queue_url)
                .receipt_handle(receipt_handle)
                .send()
                .await
                .map_err(backend)?;
        }

        match msg.body() {
            Some(body) => Ok(Some(JobMessage::decode(body)?.job_id)),
            None => Err(QueueError::Serialization("empty message body".to_string())),
        }
    }
}
