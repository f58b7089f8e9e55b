use crate::domain::events::JobEvent;

/// Receives progress events. Publishing never fails the pipeline.
#[cfg_attr(test, mockall::automock)]
pub trait JobEventSink: Send + Sync {
    fn publish(&self, event: JobEvent);
}
