use crate::adapters::events::EventHub;
use crate::application::cancellation::CancellationService;
use crate::application::intake::IntakeService;
use crate::application::status::StatusReporter;
use std::sync::Arc;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<IntakeService>,
    pub status: Arc<StatusReporter>,
    pub cancellation: Arc<CancellationService>,
    pub hub: Arc<EventHub>,
}
