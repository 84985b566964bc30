// Session metrics module
//
// Provides lightweight counters for monitoring an editing session

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Editing session metrics
///
/// Uses atomic operations for thread-safe tracking without locks, so the
/// background status poller and log follower can record alongside the
/// session itself. Logged on [`crate::session::EditorSession::stop`].
#[derive(Debug)]
pub struct Metrics {
    /// Environment file loads (including template fallbacks)
    pub loads: AtomicU64,

    /// Successful saves
    pub saves: AtomicU64,

    /// Saves aborted by a failed syntax check or write
    pub save_failures: AtomicU64,

    /// Lifecycle verbs that completed
    pub service_actions: AtomicU64,

    /// Lifecycle verbs that failed
    pub service_action_failures: AtomicU64,

    /// Status refreshes performed
    pub status_polls: AtomicU64,

    /// Status refreshes that failed
    pub status_poll_failures: AtomicU64,

    /// Log chunks forwarded from a follow stream
    pub log_chunks: AtomicU64,

    /// Session events broadcast
    pub broadcasts: AtomicU64,

    /// Session start time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            loads: AtomicU64::new(0),
            saves: AtomicU64::new(0),
            save_failures: AtomicU64::new(0),
            service_actions: AtomicU64::new(0),
            service_action_failures: AtomicU64::new(0),
            status_polls: AtomicU64::new(0),
            status_poll_failures: AtomicU64::new(0),
            log_chunks: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_save(&self) {
        self.saves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_save_failure(&self) {
        self.save_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lifecycle verb and whether it succeeded
    pub fn record_service_action(&self, success: bool) {
        if success {
            self.service_actions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.service_action_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a status refresh and whether it succeeded
    pub fn record_status_poll(&self, success: bool) {
        if success {
            self.status_polls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.status_poll_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_log_chunk(&self) {
        self.log_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get session uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Session Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "File: {} loads, {} saves, {} failed saves",
            self.loads.load(Ordering::Relaxed),
            self.saves.load(Ordering::Relaxed),
            self.save_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Service: {} actions ({} failed), {} status polls ({} failed)",
            self.service_actions.load(Ordering::Relaxed),
            self.service_action_failures.load(Ordering::Relaxed),
            self.status_polls.load(Ordering::Relaxed),
            self.status_poll_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Log chunks: {}, events broadcast: {}",
            self.log_chunks.load(Ordering::Relaxed),
            self.broadcasts.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
