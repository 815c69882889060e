//! Deadline Clock: derives the hard deadline of an attempt and ticks the
//! remaining time down on a single owned timer task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::utils::time::TimeSource;

/// Deadline arithmetic for one attempt.
///
/// The deadline is anchored to the client-established start timestamp, so it
/// is the same no matter when the session is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineClock {
    deadline_ms: i64,
}

impl DeadlineClock {
    pub fn new(start_timestamp_ms: i64, time_limit_minutes: i64) -> Self {
        Self {
            deadline_ms: start_timestamp_ms.saturating_add(time_limit_minutes.saturating_mul(60_000)),
        }
    }

    pub fn deadline_ms(&self) -> i64 {
        self.deadline_ms
    }

    /// Whole seconds left at `now_ms`, never negative.
    pub fn remaining_secs(&self, now_ms: i64) -> u64 {
        let left = self.deadline_ms.saturating_sub(now_ms);
        if left <= 0 { 0 } else { (left / 1_000) as u64 }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.remaining_secs(now_ms) == 0
    }

    /// Spawns the ticking task.
    ///
    /// Every `tick` the remaining seconds are published on the returned
    /// handle's channel. When they reach zero the task leaves its loop and
    /// only then calls `on_expire`, exactly once. `on_expire` must not block;
    /// spawn any long-running work from it so that stopping the clock does
    /// not cancel that work.
    pub fn start<F>(self, time: Arc<dyn TimeSource>, tick: Duration, on_expire: F) -> ClockHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = watch::channel(self.remaining_secs(time.now_ms()));

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let remaining = self.remaining_secs(time.now_ms());
                tx.send_replace(remaining);
                if remaining == 0 {
                    break;
                }
            }

            tracing::info!("Deadline reached, stopping clock");
            on_expire();
        });

        ClockHandle { task, remaining: rx }
    }
}

/// Owned handle of a running clock. Dropping it stops the clock.
pub struct ClockHandle {
    task: JoinHandle<()>,
    remaining: watch::Receiver<u64>,
}

impl ClockHandle {
    /// Subscribes to the remaining-seconds updates.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.remaining.clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
