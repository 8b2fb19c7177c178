//! Adaptive long-poll loop: fetch, mark activity, enqueue, commit the cursor.

use super::activity::{ActivityTracker, PollInterval};
use super::queue::DispatchQueue;
use std::sync::Arc;
use std::time::Duration;
use telegpt_telegram::{GetUpdates, TelegramError, Update, UpdateKind, UpdateSource};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// Upper bound on one uninterrupted sleep, so a shrinking interval is noticed quickly.
const MAX_SLEEP_SLICE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub long_poll_timeout: Duration,
    pub batch_limit: u32,
    pub retry_backoff: Duration,
}

/// Cursor owned by the fetcher. Only advanced after a whole batch is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollState {
    pub next_offset: i64,
}

pub struct UpdateFetcher {
    source: Arc<dyn UpdateSource>,
    tracker: Arc<ActivityTracker>,
    queue: Arc<DispatchQueue<Update>>,
    settings: FetchSettings,
    state: PollState,
    last_interval: Option<PollInterval>,
}

impl UpdateFetcher {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        tracker: Arc<ActivityTracker>,
        queue: Arc<DispatchQueue<Update>>,
        settings: FetchSettings,
        initial_offset: i64,
    ) -> anyhow::Result<Self> {
        if initial_offset < 0 {
            return Err(anyhow::anyhow!(
                "initial poll offset must be >= 0 (got {initial_offset})"
            ));
        }
        if settings.batch_limit == 0 {
            return Err(anyhow::anyhow!("batch limit must be > 0"));
        }
        Ok(Self {
            source,
            tracker,
            queue,
            settings,
            state: PollState {
                next_offset: initial_offset,
            },
            last_interval: None,
        })
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Runs until `stop` is cancelled. Transport errors never end the loop.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn run_forever(mut self, stop: CancellationToken) -> PollState {
        let settings = self.tracker.settings();
        tracing::info!(
            fast_interval_ms = settings.fast.as_millis() as u64,
            slow_interval_ms = settings.slow.as_millis() as u64,
            next_offset = self.state.next_offset,
            "fetch loop started"
        );

        while !stop.is_cancelled() {
            let cycle_started = Instant::now();
            let interval = self.observe_interval();

            let outcome = tokio::select! {
                _ = stop.cancelled() => break,
                outcome = self.poll_once(interval) => outcome,
            };

            match outcome {
                Ok(_) => {
                    if self.pause_until_next_cycle(cycle_started, &stop).await {
                        break;
                    }
                }
                Err(error) => {
                    let transient = error
                        .downcast_ref::<TelegramError>()
                        .is_none_or(TelegramError::is_transient);
                    if transient {
                        tracing::warn!(
                            %error,
                            next_offset = self.state.next_offset,
                            backoff_ms = self.settings.retry_backoff.as_millis() as u64,
                            "poll cycle failed; retrying after backoff"
                        );
                    } else {
                        tracing::error!(
                            %error,
                            next_offset = self.state.next_offset,
                            backoff_ms = self.settings.retry_backoff.as_millis() as u64,
                            "poll cycle failed with non-transient error; keeping loop alive"
                        );
                    }
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(self.settings.retry_backoff) => {}
                    }
                }
            }
        }

        tracing::info!(next_offset = self.state.next_offset, "fetch loop stopped");
        self.state
    }

    /// One fetch cycle: long-poll, mark activity, enqueue in order, then
    /// commit the cursor. Returns how many updates were queued.
    pub async fn poll_once(&mut self, interval: PollInterval) -> anyhow::Result<usize> {
        let request = GetUpdates::new(
            self.state.next_offset,
            self.settings.batch_limit,
            self.long_poll_wait_secs(interval),
        );
        let updates = self.source.get_updates(&request).await?;

        let mut highest: Option<i64> = None;
        let mut queued = 0usize;
        for update in updates {
            if update.id < self.state.next_offset {
                tracing::debug!(
                    update_id = update.id,
                    next_offset = self.state.next_offset,
                    "skipping already acknowledged update"
                );
                continue;
            }
            highest = highest.max(Some(update.id));

            if matches!(update.kind, UpdateKind::Unsupported) {
                tracing::info!(update_id = update.id, "skipping unsupported update");
                continue;
            }
            if update.is_user_text() {
                if let Some(user_id) = update.user_id() {
                    self.tracker.mark_active(user_id);
                }
            }
            self.queue.push(update)?;
            queued += 1;
        }

        if let Some(highest) = highest {
            self.state.next_offset = highest + 1;
        }
        tracing::debug!(
            queued,
            next_offset = self.state.next_offset,
            queue_depth = self.queue.len(),
            %interval,
            "poll cycle complete"
        );
        Ok(queued)
    }

    /// Server-side wait in whole seconds, rounded down so it never exceeds the
    /// current interval. A sub-second interval yields 0, a short poll.
    fn long_poll_wait_secs(&self, interval: PollInterval) -> u64 {
        let cap = self.tracker.duration_of(interval);
        self.settings.long_poll_timeout.min(cap).as_secs()
    }

    fn observe_interval(&mut self) -> PollInterval {
        let interval = self.tracker.current_interval();
        if self.last_interval != Some(interval) {
            tracing::info!(
                mode = %interval,
                interval_ms = self.tracker.duration_of(interval).as_millis() as u64,
                active_users = self.tracker.active_count(),
                "poll mode changed"
            );
            self.last_interval = Some(interval);
        }
        interval
    }

    /// Sleep until the current interval has elapsed since `cycle_started`,
    /// re-reading the interval every slice. Returns true if stopped.
    async fn pause_until_next_cycle(
        &mut self,
        cycle_started: Instant,
        stop: &CancellationToken,
    ) -> bool {
        loop {
            let interval = self.observe_interval();
            let target = self.tracker.duration_of(interval);
            let elapsed = cycle_started.elapsed();
            if elapsed >= target {
                return false;
            }
            let slice = (target - elapsed).min(MAX_SLEEP_SLICE);
            tokio::select! {
                _ = stop.cancelled() => return true,
                _ = tokio::time::sleep(slice) => {}
            }
        }
    }
}
