//! # Application State
//!
//! State shared by every connection actor and HTTP handler.
//!
//! ## Sharing Pattern:
//! - **Arc<AppConfig>**: configuration is read-only once the server runs
//! - **Arc<RwLock<CaptureMetrics>>**: counters updated by every connection
//! - **CaptureStore**: plain paths, cloned into each connection's session
//!
//! `AppState` itself is cheap to clone; clones share the same metrics.

use crate::capture::{CaptureStore, SessionEvent};
use crate::config::AppConfig;
use crate::error::CaptureError;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub metrics: Arc<RwLock<CaptureMetrics>>,
    pub store: CaptureStore,
    pub start_time: Instant,
}

/// Counters describing the capture traffic since startup.
#[derive(Debug, Default, Clone)]
pub struct CaptureMetrics {
    /// Connections currently open
    pub active_connections: u32,

    /// Connections accepted since startup
    pub total_connections: u64,

    /// Audio messages stored in a scratch artifact
    pub captures_received: u64,

    /// Captures renamed to their final name
    pub captures_committed: u64,

    /// Uncommitted captures deleted when their connection closed
    pub captures_discarded: u64,

    pub invalid_payloads: u64,
    pub unexpected_messages: u64,
    pub storage_failures: u64,
    pub commit_failures: u64,
}

impl CaptureMetrics {
    pub fn total_failures(&self) -> u64 {
        self.invalid_payloads + self.unexpected_messages + self.storage_failures + self.commit_failures
    }
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let store = CaptureStore::from_config(&config.storage);
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(CaptureMetrics::default())),
            store,
            start_time: Instant::now(),
        }
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    // A panic while holding the lock cannot leave the counters in a state
    // worth refusing to read, so poisoning is ignored.
    fn metrics_read(&self) -> RwLockReadGuard<'_, CaptureMetrics> {
        self.metrics.read().unwrap_or_else(|e| e.into_inner())
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, CaptureMetrics> {
        self.metrics.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn connection_opened(&self) {
        let mut metrics = self.metrics_write();
        metrics.active_connections += 1;
        metrics.total_connections += 1;
    }

    pub fn connection_closed(&self) {
        let mut metrics = self.metrics_write();
        if metrics.active_connections > 0 {
            metrics.active_connections -= 1;
        }
    }

    pub fn record_event(&self, event: &SessionEvent) {
        let mut metrics = self.metrics_write();
        match event {
            SessionEvent::Captured { .. } => metrics.captures_received += 1,
            SessionEvent::Committed { .. } => metrics.captures_committed += 1,
        }
    }

    pub fn record_error(&self, error: &CaptureError) {
        let mut metrics = self.metrics_write();
        match error {
            CaptureError::InvalidPayload(_) => metrics.invalid_payloads += 1,
            CaptureError::UnexpectedMessage(_) => metrics.unexpected_messages += 1,
            CaptureError::StorageFailure { .. } => metrics.storage_failures += 1,
            CaptureError::CommitFailure(_) => metrics.commit_failures += 1,
        }
    }

    pub fn record_discarded(&self) {
        self.metrics_write().captures_discarded += 1;
    }

    pub fn get_metrics_snapshot(&self) -> CaptureMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_connection_counters() {
        let state = AppState::new(AppConfig::default());
        state.connection_opened();
        state.connection_opened();
        state.connection_closed();
        state.connection_closed();
        state.connection_closed();

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_connections, 0);
        assert_eq!(metrics.total_connections, 2);
    }

    #[test]
    fn test_event_and_error_counters() {
        let state = AppState::new(AppConfig::default());
        let clone = state.clone();

        state.record_event(&SessionEvent::Captured {
            sequence: 0,
            samples: 2,
            bytes: 48,
        });
        clone.record_event(&SessionEvent::Committed {
            sequence: 0,
            name: "take1".to_string(),
            file: PathBuf::from("take1.wav"),
            samples: 2,
        });
        state.record_error(&CaptureError::CommitFailure("missing".to_string()));
        state.record_error(&CaptureError::InvalidPayload("odd".to_string()));
        state.record_discarded();

        let metrics = clone.get_metrics_snapshot();
        assert_eq!(metrics.captures_received, 1);
        assert_eq!(metrics.captures_committed, 1);
        assert_eq!(metrics.commit_failures, 1);
        assert_eq!(metrics.invalid_payloads, 1);
        assert_eq!(metrics.captures_discarded, 1);
        assert_eq!(metrics.total_failures(), 2);
    }
}
