//! The timed-assessment session engine.
//!
//! One [`ExamSession`] governs one candidate's attempt at one exam. It owns a
//! [`store::SessionStore`], a [`clock::DeadlineClock`] timer, an
//! [`monitor::AntiCheatMonitor`] and a [`submission::SubmissionPipeline`],
//! and moves through `Active -> Submitting -> Submitted`.

pub mod clock;
pub mod controller;
pub mod monitor;
pub mod pagination;
pub mod registry;
pub mod store;
pub mod submission;

use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Config,
    stores::{SnapshotStore, SubmissionStore},
    utils::time::TimeSource,
};

pub use controller::ExamSession;
pub use registry::SessionRegistry;

/// Tunables shared by every session of a host.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub tick_interval: Duration,
    pub warning_window: Duration,
    pub remote_write_timeout: Duration,
    pub anti_cheat_enabled: bool,
    /// How long a submitted session stays readable before the registry
    /// drops it.
    pub submitted_retention: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            warning_window: monitor::DEFAULT_WARNING_WINDOW,
            remote_write_timeout: Duration::from_secs(15),
            anti_cheat_enabled: true,
            submitted_retention: Duration::from_secs(300),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            warning_window: Duration::from_secs(config.warning_window_secs),
            remote_write_timeout: Duration::from_secs(config.remote_write_timeout_secs),
            anti_cheat_enabled: config.anti_cheat_enabled,
            submitted_retention: Duration::from_secs(config.submitted_retention_secs),
        }
    }
}

/// External collaborators a session talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub snapshots: Arc<dyn SnapshotStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub time: Arc<dyn TimeSource>,
}
