//! # Application State Management
//!
//! State shared by every HTTP worker. Actix clones `AppState` into each
//! worker thread, so everything inside is either immutable or wrapped in
//! `Arc<RwLock<T>>`.
//!
//! - **config**: read-only after startup, shared through a plain `Arc`
//! - **audio**: the word store and audio library behind the audio endpoint
//! - **metrics**: updated by middleware on every request

use crate::audio::{AudioLibrary, AudioService};
use crate::config::AppConfig;
use crate::db::WordStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// Configuration fixed at startup
    pub config: Arc<AppConfig>,

    /// Word lookup plus path-safe access to the audio directory
    pub audio: AudioService,

    /// Word store, also used directly by the health check
    pub words: Arc<dyn WordStore>,

    /// Request counters (updated by every request)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Request metrics collected since server start.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,

    /// Keyed by `"METHOD /route/{pattern}"` so that every word id hitting the
    /// audio endpoint lands in the same bucket.
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a single route.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, words: Arc<dyn WordStore>) -> Self {
        let library = AudioLibrary::new(&config.audio.dir);

        Self {
            config: Arc::new(config),
            audio: AudioService::new(Arc::clone(&words), library),
            words,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    // A panic while holding the lock can only leave the counters slightly
    // off, so a poisoned lock is still used.
    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn increment_request_count(&self) {
        self.metrics_write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics_write().error_count += 1;
    }

    /// Record one finished request against `endpoint`.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Copy of the current metrics, so the lock isn't held while a response
    /// is serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::words::MemoryWordStore;

    fn state() -> AppState {
        AppState::new(AppConfig::default(), Arc::new(MemoryWordStore::default()))
    }

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let state = state();
        state.record_endpoint_request("GET /api/audio/{word_id}", 10, false);
        state.record_endpoint_request("GET /api/audio/{word_id}", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /api/audio/{word_id}"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.error_count, 1);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_counters() {
        let state = state();
        state.increment_request_count();
        state.increment_request_count();
        state.increment_error_count();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);
    }

    #[test]
    fn test_audio_library_uses_configured_dir() {
        let state = state();
        assert_eq!(state.audio.library().base_dir(), std::path::Path::new("data/audio"));
    }
}
