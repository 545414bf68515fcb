// Token refresh triggers: worker relay, visibility/focus settle and periodic timer
// Each trigger owns one task slot; re-arming aborts whatever the slot held

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::messages::WorkerMessage;
use super::router::Visibility;
use super::token::TokenLifecycleManager;

/// Schedules best-effort token refreshes
pub struct RefreshScheduler {
    tokens: Arc<TokenLifecycleManager>,
    settle_delay: Duration,
    initial_delay: Duration,
    interval: Duration,
    jitter: f64,
    visibility_task: Mutex<Option<JoinHandle<()>>>,
    periodic_task: Mutex<Option<JoinHandle<()>>>,
    relay_task: Mutex<Option<JoinHandle<()>>>,
}

fn replace(slot: &Mutex<Option<JoinHandle<()>>>, task: Option<JoinHandle<()>>) {
    if let Some(previous) = std::mem::replace(&mut *slot.lock(), task) {
        previous.abort();
    }
}

fn jittered(interval: Duration, jitter: f64) -> Duration {
    interval.mul_f64(1.0 + rand::random::<f64>() * jitter)
}

fn is_running(slot: &Mutex<Option<JoinHandle<()>>>) -> bool {
    slot.lock().as_ref().is_some_and(|task| !task.is_finished())
}

impl RefreshScheduler {
    pub fn new(
        tokens: Arc<TokenLifecycleManager>,
        settle_delay: Duration,
        initial_delay: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            tokens,
            settle_delay,
            initial_delay,
            interval,
            jitter: 0.0,
            visibility_task: Mutex::new(None),
            periodic_task: Mutex::new(None),
            relay_task: Mutex::new(None),
        }
    }

    /// Lengthen each periodic delay by up to `jitter` of the interval, clamped to `0.0..=1.0`.
    /// Without it the interval is fixed.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Page became visible: refresh once the settle delay passes
    pub fn on_visibility_change(&self, visibility: Visibility) {
        if visibility != Visibility::Visible {
            return;
        }
        self.schedule_settled_refresh("visibility");
    }

    /// Window regained focus: same settle path as visibility
    pub fn on_window_focus(&self) {
        self.schedule_settled_refresh("focus");
    }

    fn schedule_settled_refresh(&self, trigger: &'static str) {
        let tokens = Arc::clone(&self.tokens);
        let delay = self.settle_delay;
        let task = tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                tokens.refresh_token().await;
            }
            .instrument(tracing::debug_span!("settled_refresh", trigger)),
        );
        replace(&self.visibility_task, Some(task));
    }

    pub fn has_pending_settle(&self) -> bool {
        is_running(&self.visibility_task)
    }

    /// Start the periodic refresh loop for the rest of the session
    pub fn start_periodic(&self) {
        let tokens = Arc::clone(&self.tokens);
        let initial = self.initial_delay;
        let interval = self.interval;
        let jitter = self.jitter;
        let task = tokio::spawn(
            async move {
                tokio::time::sleep(initial).await;
                loop {
                    tokens.refresh_token().await;
                    let delay = jittered(interval, jitter);
                    tracing::trace!(?delay, "Next periodic token refresh scheduled");
                    tokio::time::sleep(delay).await;
                }
            }
            .instrument(tracing::debug_span!("periodic_refresh")),
        );
        replace(&self.periodic_task, Some(task));
        tracing::debug!(initial = ?initial, interval = ?interval, "Periodic token refresh started");
    }

    pub fn stop_periodic(&self) {
        replace(&self.periodic_task, None);
    }

    pub fn is_periodic_active(&self) -> bool {
        is_running(&self.periodic_task)
    }

    /// Relay token rotations posted by the worker
    pub fn attach_worker_channel(&self, mut messages: broadcast::Receiver<Value>) {
        let tokens = Arc::clone(&self.tokens);
        let task = tokio::spawn(
            async move {
                loop {
                    match messages.recv().await {
                        Ok(value) => match WorkerMessage::from_value(&value) {
                            Ok(WorkerMessage::TokenRefresh { token }) => {
                                tokens.relay_token(token).await;
                            },
                            Ok(other) => {
                                tracing::debug!(kind = other.kind(), "Ignoring worker message");
                            },
                            Err(e) => tracing::debug!(error = %e, "Ignoring malformed worker message"),
                        },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Worker messages dropped; refreshing token");
                            tokens.refresh_token().await;
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                tracing::debug!("Worker message channel closed");
            }
            .instrument(tracing::debug_span!("worker_relay")),
        );
        replace(&self.relay_task, Some(task));
    }

    pub fn is_relay_attached(&self) -> bool {
        is_running(&self.relay_task)
    }

    /// Abort every timer and listener
    pub fn shutdown(&self) {
        replace(&self.visibility_task, None);
        replace(&self.periodic_task, None);
        replace(&self.relay_task, None);
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::backends::{InMemoryRegistry, SimulatedBrowser};
    use crate::components::{
        PermissionNegotiator, PermissionState, SubscriptionStore, WorkerRegistrationManager,
    };

    fn scheduler(browser: &SimulatedBrowser) -> RefreshScheduler {
        let store = SubscriptionStore::new(true, PermissionState::Granted);
        let negotiator = Arc::new(PermissionNegotiator::new(Arc::new(browser.clone()), store.clone()));
        let worker = Arc::new(WorkerRegistrationManager::new(
            Arc::new(browser.clone()),
            "/sw.js",
            "/",
            Duration::from_millis(100),
        ));
        let tokens = Arc::new(TokenLifecycleManager::new(
            store,
            negotiator,
            worker,
            Arc::new(browser.clone()),
            Arc::new(InMemoryRegistry::new()),
            None,
        ));
        RefreshScheduler::new(
            tokens,
            Duration::from_secs(1),
            Duration::from_secs(10),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn jitter_stays_within_bound() {
        let interval = Duration::from_secs(3600);
        for _ in 0..100 {
            let delay = jittered(interval, 0.05);
            assert!(delay >= interval);
            assert!(delay <= Duration::from_secs(3780));
        }
        assert_eq!(jittered(interval, 0.0), interval);
    }

    #[test]
    fn interval_is_fixed_unless_jitter_requested() {
        let browser = SimulatedBrowser::new();
        assert_eq!(scheduler(&browser).jitter, 0.0);
        assert_eq!(scheduler(&browser).with_jitter(0.2).jitter, 0.2);
        assert_eq!(scheduler(&browser).with_jitter(7.0).jitter, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_clears_every_slot() {
        let browser = SimulatedBrowser::new();
        let scheduler = scheduler(&browser);
        let (_tx, rx) = broadcast::channel(4);

        scheduler.attach_worker_channel(rx);
        scheduler.on_window_focus();
        scheduler.start_periodic();
        assert!(scheduler.is_relay_attached());
        assert!(scheduler.has_pending_settle());
        assert!(scheduler.is_periodic_active());

        scheduler.on_visibility_change(Visibility::Hidden);
        assert!(scheduler.has_pending_settle(), "hidden page leaves the pending settle alone");

        scheduler.shutdown();
        assert!(!scheduler.is_relay_attached());
        assert!(!scheduler.has_pending_settle());
        assert!(!scheduler.is_periodic_active());
    }
}
