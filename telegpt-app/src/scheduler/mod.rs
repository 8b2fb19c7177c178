//! Adaptive long-poll scheduler: a fetch loop and a processing loop sharing
//! one activity tracker and one dispatch queue.

pub mod activity;
pub mod fetcher;
pub mod processor;
pub mod queue;

use crate::config::PollingConfig;
use crate::handlers::UpdateHandler;
use activity::{ActivitySettings, ActivityTracker};
use fetcher::{FetchSettings, PollState, UpdateFetcher};
use processor::{ProcessSettings, UpdateProcessor};
use queue::DispatchQueue;
use std::sync::Arc;
use telegpt_telegram::{Messenger, Update, UpdateSource};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub activity: ActivitySettings,
    pub fetch: FetchSettings,
    pub process: ProcessSettings,
    pub initial_offset: i64,
}

impl From<&PollingConfig> for SchedulerSettings {
    fn from(cfg: &PollingConfig) -> Self {
        Self {
            activity: ActivitySettings {
                fast: cfg.fast_interval(),
                slow: cfg.slow_interval(),
                activity_timeout: cfg.activity_timeout(),
            },
            fetch: FetchSettings {
                long_poll_timeout: cfg.long_poll_timeout(),
                batch_limit: cfg.batch_limit,
                retry_backoff: cfg.retry_backoff(),
            },
            process: ProcessSettings {
                pop_timeout: cfg.queue_pop_timeout(),
                grace_delay: cfg.grace_delay(),
            },
            initial_offset: cfg.initial_offset,
        }
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Spawn both loops. Fails only on invalid startup state (e.g. a negative
    /// initial offset); nothing inside the loops can fail the scheduler.
    pub fn start(
        source: Arc<dyn UpdateSource>,
        handler: Arc<dyn UpdateHandler>,
        messenger: Arc<dyn Messenger>,
        settings: SchedulerSettings,
    ) -> anyhow::Result<SchedulerHandle> {
        let tracker = ActivityTracker::new(settings.activity);
        let queue: Arc<DispatchQueue<Update>> = Arc::new(DispatchQueue::new());

        let fetcher = UpdateFetcher::new(
            source,
            Arc::clone(&tracker),
            Arc::clone(&queue),
            settings.fetch,
            settings.initial_offset,
        )?;
        let processor = UpdateProcessor::new(
            Arc::clone(&queue),
            Arc::clone(&tracker),
            handler,
            messenger,
            settings.process,
        );

        let stop = CancellationToken::new();
        let fetch_task = tokio::spawn(fetcher.run_forever(stop.child_token()));
        let process_task = tokio::spawn(processor.run_forever(stop.child_token()));
        tracing::info!(initial_offset = settings.initial_offset, "scheduler started");

        Ok(SchedulerHandle {
            stop,
            tracker,
            queue,
            fetch_task,
            process_task,
        })
    }
}

pub struct SchedulerHandle {
    stop: CancellationToken,
    tracker: Arc<ActivityTracker>,
    queue: Arc<DispatchQueue<Update>>,
    fetch_task: JoinHandle<PollState>,
    process_task: JoinHandle<u64>,
}

impl SchedulerHandle {
    #[cfg(test)]
    pub fn tracker(&self) -> &Arc<ActivityTracker> {
        &self.tracker
    }

    /// Signal both loops, then wait for each to observe it. An in-flight
    /// handler finishes before this returns.
    pub async fn stop(self) -> anyhow::Result<PollState> {
        self.stop.cancel();
        let (fetched, processed) = tokio::join!(self.fetch_task, self.process_task);
        let state = fetched.map_err(|e| anyhow::anyhow!("fetch loop task failed: {e}"))?;
        let processed =
            processed.map_err(|e| anyhow::anyhow!("processing loop task failed: {e}"))?;
        tracing::info!(
            next_offset = state.next_offset,
            processed,
            dropped_from_queue = self.queue.len(),
            active_users = self.tracker.active_count(),
            "scheduler stopped"
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingMessenger, ScriptedSource, text_update};
    use activity::PollInterval;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Simulated slow backend: every update takes four seconds.
    #[derive(Default)]
    struct SlowHandler {
        finished_at: Mutex<Vec<(i64, Instant)>>,
    }

    #[async_trait]
    impl UpdateHandler for SlowHandler {
        async fn handle(&self, update: Update) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(4)).await;
            self.finished_at
                .lock()
                .expect("finished lock")
                .push((update.id, Instant::now()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl UpdateHandler for RecordingHandler {
        async fn handle(&self, update: Update) -> Result<()> {
            self.seen.lock().expect("seen lock").push(update.id);
            Ok(())
        }
    }

    fn settings() -> SchedulerSettings {
        SchedulerSettings::from(&PollingConfig::default())
    }

    #[test]
    fn defaults_match_documented_cadence() {
        let s = settings();
        assert_eq!(s.activity.slow, Duration::from_secs(10));
        assert_eq!(s.activity.fast, Duration::from_secs(2));
        assert_eq!(s.activity.activity_timeout, Duration::from_secs(20));
        assert_eq!(s.process.grace_delay, Duration::from_secs(3));
        assert_eq!(s.process.pop_timeout, Duration::from_secs(1));
        assert_eq!(s.fetch.long_poll_timeout, Duration::from_secs(5));
        assert_eq!(s.fetch.batch_limit, 100);
        assert_eq!(s.fetch.retry_backoff, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn negative_initial_offset_fails_at_start() {
        let mut s = settings();
        s.initial_offset = -5;
        let started = Scheduler::start(
            Arc::new(ScriptedSource::default()),
            Arc::new(SlowHandler::default()),
            Arc::new(RecordingMessenger::default()),
            s,
        );
        assert!(started.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_keeps_fast_polling_until_grace_delay_after_completion() {
        let source = Arc::new(ScriptedSource::default());
        source.push_ok(vec![text_update(100, 7, "explain monads")]);
        let handler = Arc::new(SlowHandler::default());
        let handle = Scheduler::start(
            Arc::clone(&source) as Arc<dyn UpdateSource>,
            Arc::clone(&handler) as Arc<dyn UpdateHandler>,
            Arc::new(RecordingMessenger::default()),
            settings(),
        )
        .expect("scheduler");
        let t0 = Instant::now();

        // The first poll returns the message; the handler then runs t0..t0+4s.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(handle.tracker().is_active(7));
        assert_eq!(handle.tracker().current_interval(), PollInterval::Fast);

        tokio::time::sleep(Duration::from_millis(3_400)).await;
        assert_eq!(
            handle.tracker().current_interval(),
            PollInterval::Fast,
            "fast while the backend is busy"
        );

        // Handler completes at t0+4s; removal is due exactly at t0+7s.
        tokio::time::sleep_until(t0 + Duration::from_millis(6_999)).await;
        assert_eq!(handler.finished_at.lock().expect("finished lock")[0].1, t0 + Duration::from_secs(4));
        assert!(handle.tracker().is_active(7));
        tokio::time::sleep_until(t0 + Duration::from_millis(7_001)).await;
        assert!(!handle.tracker().is_active(7));
        assert_eq!(handle.tracker().current_interval(), PollInterval::Slow);

        let state = handle.stop().await.expect("stop");
        assert_eq!(state.next_offset, 101);

        // Polls during the busy window were spaced at the fast interval.
        let calls = source.calls();
        let busy: Vec<Duration> = calls
            .iter()
            .map(|c| c.at - t0)
            .filter(|at| *at > Duration::ZERO && *at <= Duration::from_secs(4))
            .collect();
        assert_eq!(
            busy,
            vec![Duration::from_secs(2), Duration::from_secs(4)],
            "calls: {calls:?}"
        );
        assert!(calls[1..].iter().all(|c| c.offset == 101));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_offset_commit_redelivers_batch_and_processor_keeps_going() {
        let s = settings();
        let tracker = ActivityTracker::new(s.activity);
        let queue: Arc<DispatchQueue<Update>> = Arc::new(DispatchQueue::new());
        let source = Arc::new(ScriptedSource::default());
        source.push_ok(vec![text_update(10, 7, "a"), text_update(11, 8, "b")]);
        source.push_ok(vec![text_update(10, 7, "a"), text_update(11, 8, "b")]);
        source.push_ok(vec![text_update(12, 7, "c")]);

        let handler = Arc::new(RecordingHandler::default());
        let processor = UpdateProcessor::new(
            Arc::clone(&queue),
            Arc::clone(&tracker),
            Arc::clone(&handler) as Arc<dyn UpdateHandler>,
            Arc::new(RecordingMessenger::default()),
            s.process,
        );
        let stop = CancellationToken::new();
        let processing = tokio::spawn(processor.run_forever(stop.clone()));

        let mut first = UpdateFetcher::new(
            Arc::clone(&source) as Arc<dyn UpdateSource>,
            Arc::clone(&tracker),
            Arc::clone(&queue),
            s.fetch,
            10,
        )
        .expect("fetcher");
        assert_eq!(first.poll_once(PollInterval::Slow).await.expect("delivery"), 2);
        assert_eq!(first.state().next_offset, 12);

        // The committed 12 is lost; a restart resumes from the last persisted 10.
        let mut restarted = UpdateFetcher::new(
            Arc::clone(&source) as Arc<dyn UpdateSource>,
            Arc::clone(&tracker),
            Arc::clone(&queue),
            s.fetch,
            10,
        )
        .expect("fetcher");
        assert_eq!(restarted.poll_once(PollInterval::Slow).await.expect("redelivery"), 2);
        assert_eq!(restarted.poll_once(PollInterval::Slow).await.expect("next batch"), 1);
        assert_eq!(restarted.state().next_offset, 13);

        tokio::time::sleep(Duration::from_secs(2)).await;
        stop.cancel();
        assert_eq!(processing.await.expect("processor task"), 5);
        assert_eq!(
            *handler.seen.lock().expect("seen lock"),
            vec![10, 11, 10, 11, 12]
        );
        let offsets: Vec<i64> = source.calls().iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![10, 10, 12]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_the_in_flight_handler_finish() {
        let source = Arc::new(ScriptedSource::default());
        source.push_ok(vec![text_update(1, 7, "hi")]);
        let handler = Arc::new(SlowHandler::default());
        let handle = Scheduler::start(
            source,
            Arc::clone(&handler) as Arc<dyn UpdateHandler>,
            Arc::new(RecordingMessenger::default()),
            settings(),
        )
        .expect("scheduler");

        tokio::time::sleep(Duration::from_millis(100)).await;
        let state = handle.stop().await.expect("stop");
        assert_eq!(state.next_offset, 2);
        assert_eq!(handler.finished_at.lock().expect("finished lock").len(), 1);
    }
}
