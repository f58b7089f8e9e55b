use crate::domain::events::JobEvent;
use crate::ports::events::JobEventSink;
use tokio::sync::broadcast;

/// In-process fan-out of job events to progress streams.
#[derive(Debug)]
pub struct EventHub {
    sender: broadcast::Sender<JobEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl JobEventSink for EventHub {
    fn publish(&self, event: JobEvent) {
        // No subscribers is the normal case
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::{JobId, JobStage};
    use chrono::Utc;

    fn event(stage: JobStage) -> JobEvent {
        JobEvent {
            job_id: JobId::new(),
            stage,
            at: Utc::now(),
            detail: None,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        hub.publish(event(JobStage::Moderating));
        assert_eq!(rx.recv().await.unwrap().stage, JobStage::Moderating);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = EventHub::new();
        hub.publish(event(JobStage::Uploaded));
    }
}
