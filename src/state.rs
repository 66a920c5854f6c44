//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket session.
//!
//! ## What lives here:
//! - **Configuration**: readable by every request, replaceable through `PUT /api/v1/config`
//! - **Window pipeline**: the speech and emotion collaborators, built once at startup
//!   and shared read-only by all sessions
//! - **Stream statistics**: counters updated when sessions open and close
//!
//! ### Arc<RwLock<T>> Pattern
//! - **Arc**: many handlers and sessions hold a reference to the same data
//! - **RwLock**: many concurrent readers or one writer
//!
//! Nothing a session mutates per chunk lives here: audio buffers are owned by their
//! session loop and never shared.

use crate::audio::{SessionSummary, WindowPipeline};
use crate::config::AppConfig;
use std::sync::{Arc, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub pipeline: Arc<WindowPipeline>,
    pub stats: Arc<RwLock<StreamStats>>,
    /// When the server started (never changes, so no lock needed)
    pub start_time: Instant,
}

/// Process-wide counters across all streaming sessions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamStats {
    /// Sessions currently connected
    pub active_sessions: u32,
    /// Sessions accepted since start
    pub total_sessions: u64,
    /// Upgrades refused because the session limit was reached
    pub rejected_sessions: u64,
    pub bytes_received: u64,
    pub windows_processed: u64,
    pub results_emitted: u64,
    pub windows_skipped: u64,
    pub windows_failed: u64,
    /// Windows cut off by a disconnect while waiting on the services
    pub windows_abandoned: u64,
}

/// One reserved place under `max_concurrent_sessions`.
pub struct SessionSlot {
    state: AppState,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.state.release_session();
    }
}

impl StreamStats {
    /// Share of processed windows that failed (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.windows_processed > 0 {
            self.windows_failed as f64 / self.windows_processed as f64
        } else {
            0.0
        }
    }
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Arc<WindowPipeline>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            pipeline,
            stats: Arc::new(RwLock::new(StreamStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Reserve a slot for a new session.
    ///
    /// Check and increment happen under one write lock, so concurrent upgrades
    /// cannot both squeeze into the last slot. The slot is released when the
    /// returned guard is dropped, whether or not the session ever started.
    pub fn try_open_session(&self) -> Option<SessionSlot> {
        let max_sessions = self.config.read().unwrap().performance.max_concurrent_sessions;
        let mut stats = self.stats.write().unwrap();

        if stats.active_sessions as usize >= max_sessions {
            stats.rejected_sessions += 1;
            return None;
        }

        stats.active_sessions += 1;
        stats.total_sessions += 1;
        Some(SessionSlot { state: self.clone() })
    }

    /// Fold a finished session's summary into the totals.
    pub fn record_session(&self, summary: &SessionSummary) {
        let mut stats = self.stats.write().unwrap();
        stats.bytes_received += summary.bytes_received as u64;
        stats.windows_processed += summary.windows_processed;
        stats.results_emitted += summary.results_emitted;
        stats.windows_skipped += summary.windows_skipped;
        stats.windows_failed += summary.windows_failed;
        stats.windows_abandoned += summary.windows_abandoned;
    }

    fn release_session(&self) {
        let mut stats = self.stats.write().unwrap();
        if stats.active_sessions > 0 {
            stats.active_sessions -= 1;
        }
    }

    pub fn get_stats_snapshot(&self) -> StreamStats {
        self.stats.read().unwrap().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pipeline::testing::{pipeline, ScriptedRecognizer};

    fn state(max_sessions: usize) -> AppState {
        let mut config = AppConfig::default();
        config.performance.max_concurrent_sessions = max_sessions;
        AppState::new(config, Arc::new(pipeline(Arc::new(ScriptedRecognizer::new(vec![])))))
    }

    #[test]
    fn test_session_limit() {
        let state = state(2);
        let first = state.try_open_session();
        let second = state.try_open_session();
        assert!(first.is_some() && second.is_some());
        assert!(state.try_open_session().is_none());

        drop(first);
        let third = state.try_open_session();
        assert!(third.is_some());

        let stats = state.get_stats_snapshot();
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.rejected_sessions, 1);

        drop(second);
        drop(third);
        assert_eq!(state.get_stats_snapshot().active_sessions, 0);
    }

    #[test]
    fn test_record_session_accumulates_summary() {
        let state = state(4);
        state.record_session(&SessionSummary {
            bytes_received: 400_000,
            windows_processed: 2,
            results_emitted: 1,
            windows_skipped: 0,
            windows_failed: 1,
            windows_abandoned: 0,
            discarded_bytes: 8_000,
        });

        let stats = state.get_stats_snapshot();
        assert_eq!(stats.bytes_received, 400_000);
        assert_eq!(stats.results_emitted, 1);
        assert!((stats.failure_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_update_config_validates() {
        let state = state(4);
        let mut bad = state.get_config();
        bad.audio.window_threshold_bytes = 0;
        assert!(state.update_config(bad).is_err());
        assert_eq!(state.get_config().audio.window_threshold_bytes, 192_000);
    }
}
