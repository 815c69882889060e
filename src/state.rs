use std::sync::Arc;

use crate::config::Config;
use crate::session::{SessionDeps, SessionRegistry, SessionSettings};
use crate::stores::{ExamProvider, SnapshotStore, SubmissionStore};
use crate::utils::time::TimeSource;
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub settings: SessionSettings,
    pub exams: Arc<dyn ExamProvider>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub time: Arc<dyn TimeSource>,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn session_deps(&self) -> SessionDeps {
        SessionDeps {
            snapshots: self.snapshots.clone(),
            submissions: self.submissions.clone(),
            time: self.time.clone(),
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for SessionRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
