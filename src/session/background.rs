use crate::metrics::Metrics;
use crate::models::ServiceStatus;
use crate::services::{ServiceController, ServiceError};
use crate::session::SessionEvent;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Broadcast an event, ignoring the no-subscriber case.
pub(crate) fn emit(events: &broadcast::Sender<SessionEvent>, metrics: &Metrics, event: SessionEvent) {
    if events.send(event).is_ok() {
        metrics.record_broadcast();
    }
}

/// A spawned task plus the switch that stops it.
///
/// Dropping the handle flips the switch, so a replaced or forgotten task
/// always winds down on its own.
pub(crate) struct BackgroundTask {
    cancel: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    pub(crate) fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (cancel, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(task(cancel_rx));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal the task and wait for it to exit.
    pub(crate) async fn shutdown(mut self) {
        let _ = self.cancel.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

/// Refreshes the cached service status and announces the result.
#[derive(Clone)]
pub(crate) struct StatusTracker {
    controller: ServiceController,
    latest: Arc<RwLock<Option<ServiceStatus>>>,
    events: broadcast::Sender<SessionEvent>,
    metrics: Arc<Metrics>,
}

impl StatusTracker {
    pub(crate) fn new(
        controller: ServiceController,
        events: broadcast::Sender<SessionEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            controller,
            latest: Arc::new(RwLock::new(None)),
            events,
            metrics,
        }
    }

    pub(crate) fn latest(&self) -> Option<ServiceStatus> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) async fn refresh(&self) -> Result<ServiceStatus, ServiceError> {
        match self.controller.status().await {
            Ok(status) => {
                self.metrics.record_status_poll(true);
                *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(status.clone());
                emit(&self.events, &self.metrics, SessionEvent::StatusUpdated(status.clone()));
                Ok(status)
            }
            Err(e) => {
                self.metrics.record_status_poll(false);
                tracing::warn!("Failed to refresh status of {}: {}", self.controller.unit(), e);
                emit(
                    &self.events,
                    &self.metrics,
                    SessionEvent::StatusFailed {
                        message: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Refresh every `period` until cancelled. The first refresh is immediate.
    pub(crate) fn spawn_poller(&self, period: Duration) -> BackgroundTask {
        let tracker = self.clone();
        BackgroundTask::spawn(move |mut cancel| async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!("Status polling every {:?}", period);

            loop {
                tokio::select! {
                    _ = cancel.changed() => break,
                    _ = ticker.tick() => {
                        let _ = tracker.refresh().await;
                    }
                }
            }
            tracing::debug!("Status polling stopped");
        })
    }

    /// One refresh after `delay`, e.g. once a lifecycle verb has settled.
    pub(crate) fn spawn_delayed_refresh(&self, delay: Duration) -> BackgroundTask {
        let tracker = self.clone();
        BackgroundTask::spawn(move |mut cancel| async move {
            tokio::select! {
                _ = cancel.changed() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tracker.refresh().await;
                }
            }
        })
    }
}

/// Follow the unit's journal into a fresh channel.
pub(crate) fn spawn_log_follower(
    controller: ServiceController,
    events: broadcast::Sender<SessionEvent>,
    metrics: Arc<Metrics>,
    capacity: usize,
) -> (BackgroundTask, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(capacity);

    let task = BackgroundTask::spawn(move |cancel| async move {
        let (raw_tx, mut raw_rx) = mpsc::channel::<String>(capacity);

        let forward = async {
            while let Some(chunk) = raw_rx.recv().await {
                metrics.record_log_chunk();
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            // Closing the raw side makes the journal stream stop too
            drop(raw_rx);
        };

        let (result, ()) = tokio::join!(controller.follow_logs(raw_tx, cancel), forward);
        match result {
            Ok(code) => tracing::info!("Log follow ended (exit code {:?})", code),
            Err(e) => tracing::error!("Log follow failed: {}", e),
        }
        emit(&events, &metrics, SessionEvent::LogFollowStopped);
    });

    (task, rx)
}
