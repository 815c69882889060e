//! Anti-Cheat Monitor: counts focus-loss signals and rate-limits warnings.
//!
//! Purely observational. Every signal counts; only the user-visible warning
//! is throttled to one per window.

use std::time::Duration;

use crate::models::session::{FocusReport, FocusSignal};
use crate::session::store::SessionStore;

pub const DEFAULT_WARNING_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct AntiCheatMonitor {
    enabled: bool,
    running: bool,
    window_ms: i64,
    last_warned_at: Option<i64>,
}

impl AntiCheatMonitor {
    /// `enabled = false` is for hosts with no focus concept: the monitor
    /// then ignores every signal.
    pub fn new(enabled: bool, window: Duration) -> Self {
        Self {
            enabled,
            running: false,
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
            last_warned_at: None,
        }
    }

    pub fn start(&mut self) {
        self.running = self.enabled;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Records `signal` against the session. Returns `None` when the monitor
    /// is not running.
    pub fn observe(
        &mut self,
        signal: FocusSignal,
        store: &mut SessionStore,
        now_ms: i64,
    ) -> Option<FocusReport> {
        if !self.running {
            tracing::debug!("Ignoring {:?} signal for {}: monitor stopped", signal, store.key());
            return None;
        }

        let tab_switch_count = store.record_tab_switch();
        let warning = self.should_warn(now_ms);
        tracing::info!(
            "Focus lost ({:?}) in session {}: count={}, warning={}",
            signal,
            store.key(),
            tab_switch_count,
            warning
        );

        Some(FocusReport {
            tab_switch_count,
            warning,
        })
    }

    fn should_warn(&mut self, now_ms: i64) -> bool {
        let recently_warned = self
            .last_warned_at
            .is_some_and(|at| now_ms.saturating_sub(at) < self.window_ms);
        if recently_warned {
            return false;
        }
        self.last_warned_at = Some(now_ms);
        true
    }
}
