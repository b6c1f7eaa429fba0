use std::sync::Arc;

use crate::db::JobStore;
use crate::services::{identity::IdentityService, orchestrator::Orchestrator, scheduler::DailyTrigger};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub orchestrator: Orchestrator,
    pub identity: Arc<IdentityService>,
    /// Absent when the process runs without the daily trigger.
    pub trigger: Option<Arc<DailyTrigger>>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, identity: IdentityService) -> Self {
        Self {
            store: orchestrator.store().clone(),
            orchestrator,
            identity: Arc::new(identity),
            trigger: None,
        }
    }

    pub fn with_trigger(mut self, trigger: Arc<DailyTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }
}
