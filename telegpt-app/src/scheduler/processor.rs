//! Drains the dispatch queue one update at a time.

use super::activity::ActivityTracker;
use super::queue::DispatchQueue;
use crate::handlers::UpdateHandler;
use crate::views;
use std::sync::Arc;
use std::time::Duration;
use telegpt_telegram::{Messenger, OutgoingMessage, Update};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct ProcessSettings {
    pub pop_timeout: Duration,
    pub grace_delay: Duration,
}

pub struct UpdateProcessor {
    queue: Arc<DispatchQueue<Update>>,
    tracker: Arc<ActivityTracker>,
    handler: Arc<dyn UpdateHandler>,
    messenger: Arc<dyn Messenger>,
    settings: ProcessSettings,
}

impl UpdateProcessor {
    pub fn new(
        queue: Arc<DispatchQueue<Update>>,
        tracker: Arc<ActivityTracker>,
        handler: Arc<dyn UpdateHandler>,
        messenger: Arc<dyn Messenger>,
        settings: ProcessSettings,
    ) -> Self {
        Self {
            queue,
            tracker,
            handler,
            messenger,
            settings,
        }
    }

    /// Runs until `stop` is cancelled. Returns how many updates were handled.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn run_forever(self, stop: CancellationToken) -> u64 {
        tracing::info!(
            pop_timeout_ms = self.settings.pop_timeout.as_millis() as u64,
            grace_delay_ms = self.settings.grace_delay.as_millis() as u64,
            "processing loop started"
        );
        let mut processed = 0u64;
        while !stop.is_cancelled() {
            let Some(update) = self.queue.pop(self.settings.pop_timeout).await else {
                continue;
            };
            self.process(update).await;
            processed += 1;
        }

        let left = self.queue.len();
        if left > 0 {
            tracing::warn!(left, "processing loop stopped with updates still queued");
        }
        tracing::info!(processed, "processing loop stopped");
        processed
    }

    /// Handle one update in its own task so a panic stays contained, then
    /// schedule the user's deactivation.
    async fn process(&self, update: Update) {
        let update_id = update.id;
        let user_id = update.user_id();
        let chat_id = update.chat_id();
        let started = Instant::now();

        let handler = Arc::clone(&self.handler);
        let outcome = tokio::spawn(async move { handler.handle(update).await }).await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(format!("{error:#}")),
            Err(join) if join.is_panic() => Some("handler panicked".to_string()),
            Err(join) => Some(join.to_string()),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match failure {
            None => tracing::debug!(update_id, ?user_id, elapsed_ms, "update handled"),
            Some(error) => {
                tracing::error!(update_id, ?user_id, elapsed_ms, %error, "update handler failed");
                if let Some(chat_id) = chat_id {
                    self.notify_failure(chat_id).await;
                }
            }
        }

        if let Some(user_id) = user_id {
            if self.tracker.is_active(user_id) {
                self.tracker
                    .mark_inactive_after(user_id, self.settings.grace_delay);
            }
        }
    }

    async fn notify_failure(&self, chat_id: i64) {
        if let Err(error) = self
            .messenger
            .send_message(chat_id, OutgoingMessage::text(views::GENERIC_ERROR))
            .await
        {
            tracing::warn!(chat_id, %error, "failed to deliver error notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::activity::ActivitySettings;
    use crate::testing::{RecordingMessenger, callback_update, text_update};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use telegpt_telegram::UpdateKind;

    /// Behaves according to the message text: `fail`, `panic`, `slow`, else ok.
    #[derive(Default)]
    struct ScriptedHandler {
        handled: Mutex<Vec<i64>>,
    }

    impl ScriptedHandler {
        fn handled(&self) -> Vec<i64> {
            self.handled.lock().expect("handled lock").clone()
        }
    }

    #[async_trait]
    impl UpdateHandler for ScriptedHandler {
        async fn handle(&self, update: Update) -> Result<()> {
            self.handled.lock().expect("handled lock").push(update.id);
            let text = match &update.kind {
                UpdateKind::Message(message) => message.text.clone().unwrap_or_default(),
                _ => String::new(),
            };
            match text.as_str() {
                "fail" => Err(anyhow::anyhow!("store unavailable")),
                "panic" => panic!("handler bug"),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(4)).await;
                    Ok(())
                }
                _ => Ok(()),
            }
        }
    }

    struct Fixture {
        queue: Arc<DispatchQueue<Update>>,
        tracker: Arc<ActivityTracker>,
        handler: Arc<ScriptedHandler>,
        messenger: Arc<RecordingMessenger>,
        stop: CancellationToken,
        task: tokio::task::JoinHandle<u64>,
    }

    fn start() -> Fixture {
        let queue = Arc::new(DispatchQueue::new());
        let tracker = ActivityTracker::new(ActivitySettings {
            fast: Duration::from_secs(2),
            slow: Duration::from_secs(10),
            activity_timeout: Duration::from_secs(20),
        });
        let handler = Arc::new(ScriptedHandler::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let processor = UpdateProcessor::new(
            Arc::clone(&queue),
            Arc::clone(&tracker),
            Arc::clone(&handler) as Arc<dyn UpdateHandler>,
            Arc::clone(&messenger) as Arc<dyn Messenger>,
            ProcessSettings {
                pop_timeout: Duration::from_secs(1),
                grace_delay: Duration::from_secs(3),
            },
        );
        let stop = CancellationToken::new();
        let task = tokio::spawn(processor.run_forever(stop.clone()));
        Fixture {
            queue,
            tracker,
            handler,
            messenger,
            stop,
            task,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failures_and_panics_are_contained_per_update() {
        let f = start();
        for update in [
            text_update(1, 7, "fail"),
            text_update(2, 8, "panic"),
            text_update(3, 9, "fine"),
        ] {
            f.queue.push(update).expect("push");
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        f.stop.cancel();
        let processed = f.task.await.expect("processor task");

        assert_eq!(processed, 3);
        assert_eq!(f.handler.handled(), vec![1, 2, 3]);
        assert_eq!(
            f.messenger.texts(),
            vec![views::GENERIC_ERROR.to_string(), views::GENERIC_ERROR.to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_delivery_is_handled_twice_without_breaking_the_loop() {
        let f = start();
        f.queue.push(text_update(10, 7, "hi")).expect("push");
        f.queue.push(text_update(10, 7, "hi")).expect("push duplicate");
        f.queue.push(callback_update(11, 7, "help")).expect("push");
        tokio::time::sleep(Duration::from_secs(2)).await;
        f.stop.cancel();
        f.task.await.expect("processor task");
        assert_eq!(f.handler.handled(), vec![10, 10, 11]);
    }

    #[tokio::test(start_paused = true)]
    async fn active_user_is_released_after_grace_delay() {
        let f = start();
        f.tracker.mark_active(7);
        f.queue.push(text_update(1, 7, "hi")).expect("push");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.handler.handled(), vec![1]);
        assert!(f.tracker.is_active(7));

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert!(f.tracker.is_active(7), "still inside the grace delay");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!f.tracker.is_active(7));

        f.stop.cancel();
        f.task.await.expect("processor task");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_the_in_flight_handler() {
        let f = start();
        f.queue.push(text_update(1, 7, "slow")).expect("push");
        tokio::time::sleep(Duration::from_millis(10)).await;
        let stopped_at = Instant::now();
        f.stop.cancel();
        let processed = f.task.await.expect("processor task");
        assert_eq!(processed, 1);
        assert!(stopped_at.elapsed() >= Duration::from_millis(3_990));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_loop_observes_stop_within_pop_timeout() {
        let f = start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stopped_at = Instant::now();
        f.stop.cancel();
        assert_eq!(f.task.await.expect("processor task"), 0);
        assert!(stopped_at.elapsed() <= Duration::from_secs(1));
        assert!(f.queue.is_empty());
    }
}
