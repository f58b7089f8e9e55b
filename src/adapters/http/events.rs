use super::error::ApiError;
use super::jobs::parse_job_id;
use super::state::AppState;
use crate::application::status::{JobStatusView, StatusReporter};
use crate::domain::events::JobEvent;
use crate::domain::jobs::{JobId, JobStage};
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Stored state is re-read at this pace so transitions made by workers in
/// other processes reach the stream too.
const REPOSITORY_POLL: Duration = Duration::from_secs(2);

/// `GET /jobs/:id/events`: the job's current stage, then every transition
/// until a terminal stage is reached.
pub async fn events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let id = parse_job_id(&id)?;
    // Subscribe before reading so no transition falls between the two
    let rx = state.hub.subscribe();
    let initial = to_event(state.status.status(id).await?);

    let updates: BoxStream<'static, JobEvent> = if initial.stage.is_terminal() {
        stream::empty().boxed()
    } else {
        job_updates(rx, state.status.clone(), id, initial.stage, REPOSITORY_POLL).boxed()
    };

    let stream = stream::once(async move { initial })
        .chain(updates)
        .map(|event| Event::default().event(event.stage.as_str()).json_data(&event));

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn to_event(view: JobStatusView) -> JobEvent {
    JobEvent {
        job_id: view.job_id,
        stage: view.stage,
        at: view.updated_at,
        detail: view.result_url.or(view.reason),
    }
}

struct Follow {
    rx: Receiver<JobEvent>,
    status: Arc<StatusReporter>,
    poll: Interval,
    id: JobId,
    last: JobStage,
}

impl Follow {
    async fn next(&mut self) -> Option<JobEvent> {
        loop {
            let event = tokio::select! {
                biased;
                received = self.rx.recv() => match received {
                    Ok(event) if event.job_id == self.id => event,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(job_id = %self.id, skipped, "Event stream lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                },
                _ = self.poll.tick() => match self.status.status(self.id).await {
                    Ok(view) => to_event(view),
                    Err(e) => {
                        tracing::debug!(job_id = %self.id, error = %e, "Status poll failed");
                        continue;
                    }
                },
            };
            // Hub and repository report the same transitions, in either order
            if !event.stage.is_after(self.last) {
                continue;
            }
            self.last = event.stage;
            return Some(event);
        }
    }
}

/// Stage changes of one job, ending after its terminal stage or when the hub
/// closes.
fn job_updates(
    rx: Receiver<JobEvent>,
    status: Arc<StatusReporter>,
    id: JobId,
    current: JobStage,
    poll_every: Duration,
) -> impl Stream<Item = JobEvent> + Send {
    let mut poll = interval(poll_every);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let follow = Follow {
        rx,
        status,
        poll,
        id,
        last: current,
    };

    stream::unfold(Some(follow), |follow| async move {
        let mut follow = follow?;
        let event = follow.next().await?;
        let next = (!event.stage.is_terminal()).then_some(follow);
        Some((event, next))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::EventHub;
    use crate::config::PipelineConfig;
    use crate::domain::jobs::{Job, SourceRef};
    use crate::ports::events::JobEventSink;
    use crate::ports::repository::MockJobRepository;
    use chrono::Utc;

    fn event(job_id: JobId, stage: JobStage) -> JobEvent {
        JobEvent {
            job_id,
            stage,
            at: Utc::now(),
            detail: None,
        }
    }

    fn reporter(stored: Option<Job>) -> Arc<StatusReporter> {
        let mut repo = MockJobRepository::new();
        repo.expect_get().returning(move |_| Ok(stored.clone()));
        Arc::new(StatusReporter::new(Arc::new(repo)))
    }

    #[tokio::test]
    async fn test_updates_end_after_terminal_stage() {
        let hub = EventHub::new();
        let id = JobId::new();
        let updates = job_updates(
            hub.subscribe(),
            reporter(None),
            id,
            JobStage::Uploaded,
            Duration::from_secs(60),
        );

        hub.publish(event(id, JobStage::Moderating));
        hub.publish(event(JobId::new(), JobStage::Completed));
        hub.publish(event(id, JobStage::Moderating));
        hub.publish(event(id, JobStage::Generating));
        hub.publish(event(id, JobStage::Completed));
        hub.publish(event(id, JobStage::Failed));

        let stages: Vec<JobStage> = updates.map(|e| e.stage).collect().await;
        assert_eq!(
            stages,
            vec![JobStage::Moderating, JobStage::Generating, JobStage::Completed]
        );
    }

    #[tokio::test]
    async fn test_updates_end_when_hub_closes() {
        let hub = EventHub::new();
        let id = JobId::new();
        let updates = job_updates(
            hub.subscribe(),
            reporter(None),
            id,
            JobStage::Uploaded,
            Duration::from_secs(60),
        );

        hub.publish(event(id, JobStage::Moderating));
        drop(hub);

        let stages: Vec<JobStage> = updates.map(|e| e.stage).collect().await;
        assert_eq!(stages, vec![JobStage::Moderating]);
    }

    fn stored_job() -> Job {
        Job::new(
            JobId::new(),
            SourceRef {
                key: "staging/1/source.mp4".to_string(),
                file_name: "clip.mp4".to_string(),
                content_type: "video/mp4".to_string(),
                size_bytes: 1024,
            },
            PipelineConfig::default().default_options,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_transitions_are_picked_up() {
        let hub = EventHub::new();
        let mut job = stored_job();
        job.cancel().unwrap();

        let updates = job_updates(
            hub.subscribe(),
            reporter(Some(job.clone())),
            job.id,
            JobStage::Uploaded,
            Duration::from_secs(2),
        );

        let stages: Vec<JobStage> = updates.map(|e| e.stage).collect().await;
        assert_eq!(stages, vec![JobStage::Failed]);
        drop(hub);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_hub_event_after_poll_is_dropped() {
        let hub = EventHub::new();
        let mut job = stored_job();
        job.stage = JobStage::Generating;
        let id = job.id;

        let mut updates = Box::pin(job_updates(
            hub.subscribe(),
            reporter(Some(job)),
            id,
            JobStage::Uploaded,
            Duration::from_secs(2),
        ));

        // The first poll runs before the hub has anything
        assert_eq!(updates.next().await.map(|e| e.stage), Some(JobStage::Generating));

        hub.publish(event(id, JobStage::Moderating));
        hub.publish(event(id, JobStage::Completed));
        let rest: Vec<JobStage> = updates.map(|e| e.stage).collect().await;
        assert_eq!(rest, vec![JobStage::Completed]);
    }
}
