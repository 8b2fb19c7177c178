//! In-memory table of recently active users; decides the poll cadence.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterval {
    Fast,
    Slow,
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollInterval::Fast => f.write_str("fast"),
            PollInterval::Slow => f.write_str("slow"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ActivitySettings {
    pub fast: Duration,
    pub slow: Duration,
    pub activity_timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
struct ActiveUser {
    last_activity: Instant,
    generation: u64,
}

/// Shared between the fetch loop (marks users active) and the processing
/// loop (schedules deactivation). All mutation goes through this API.
#[derive(Debug)]
pub struct ActivityTracker {
    active: DashMap<i64, ActiveUser>,
    generation: AtomicU64,
    settings: ActivitySettings,
}

impl ActivityTracker {
    pub fn new(settings: ActivitySettings) -> Arc<Self> {
        Arc::new(Self {
            active: DashMap::new(),
            generation: AtomicU64::new(0),
            settings,
        })
    }

    pub fn settings(&self) -> ActivitySettings {
        self.settings
    }

    /// Insert or refresh `user_id`. Idempotent.
    pub fn mark_active(&self, user_id: i64) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self.active.insert(
            user_id,
            ActiveUser {
                last_activity: Instant::now(),
                generation,
            },
        );
        if previous.is_none() {
            tracing::info!(
                user_id,
                active_users = self.active.len(),
                fast_interval_ms = self.settings.fast.as_millis() as u64,
                "user active; fast polling"
            );
        }
    }

    /// Remove `user_id` once `delay` has elapsed, unless the user was marked
    /// active again in the meantime.
    pub fn mark_inactive_after(self: &Arc<Self>, user_id: i64, delay: Duration) -> JoinHandle<()> {
        let scheduled_generation = self.active.get(&user_id).map(|entry| entry.generation);
        let deadline = Instant::now() + delay;
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(scheduled_generation) = scheduled_generation else {
                return;
            };
            let removed = tracker
                .active
                .remove_if(&user_id, |_, entry| entry.generation == scheduled_generation)
                .is_some();
            if removed {
                tracker.log_removal(user_id, "request completed");
            } else {
                tracing::debug!(user_id, "deactivation superseded by newer activity");
            }
        })
    }

    /// Purge stale entries, then pick the cadence: fast iff anyone is still active.
    pub fn current_interval(&self) -> PollInterval {
        self.purge_stale();
        if self.active.is_empty() {
            PollInterval::Slow
        } else {
            PollInterval::Fast
        }
    }

    pub fn duration_of(&self, interval: PollInterval) -> Duration {
        match interval {
            PollInterval::Fast => self.settings.fast,
            PollInterval::Slow => self.settings.slow,
        }
    }

    pub fn is_active(&self, user_id: i64) -> bool {
        self.active.contains_key(&user_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn purge_stale(&self) {
        let timeout = self.settings.activity_timeout;
        let stale: Vec<i64> = self
            .active
            .iter()
            .filter(|entry| entry.value().last_activity.elapsed() > timeout)
            .map(|entry| *entry.key())
            .collect();
        for user_id in stale {
            let removed = self
                .active
                .remove_if(&user_id, |_, entry| entry.last_activity.elapsed() > timeout)
                .is_some();
            if removed {
                self.log_removal(user_id, "activity timeout");
            }
        }
    }

    fn log_removal(&self, user_id: i64, reason: &'static str) {
        let remaining = self.active.len();
        tracing::debug!(user_id, reason, remaining, "user inactive");
        if remaining == 0 {
            tracing::info!(
                slow_interval_ms = self.settings.slow.as_millis() as u64,
                "no active users; slow polling"
            );
        }
    }
}
