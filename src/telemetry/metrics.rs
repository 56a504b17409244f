//! Metrics
//!
//! Login handshake metrics interfaces and implementations.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::ErrorKind;

/// Metric labels.
pub type MetricLabels = HashMap<String, String>;

/// Login handshake metrics interface.
pub trait HandshakeMetrics: Send + Sync {
    /// A fresh state cookie was issued.
    fn record_state_issued(&self);

    /// The login stage redirected to the provider.
    fn record_login_redirect(&self);

    /// The callback stage published a token.
    fn record_callback_success(&self);

    /// A stage handed an error to the failure handler.
    fn record_failure(&self, stage: &str, kind: ErrorKind);

    /// Token endpoint round trip.
    fn record_token_exchange(&self, duration: Duration, success: bool);

    /// Profile endpoint round trip.
    fn record_user_fetch(&self, provider: &str, duration: Duration, success: bool);
}

/// No-op metrics implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpMetrics;

impl HandshakeMetrics for NoOpMetrics {
    fn record_state_issued(&self) {}
    fn record_login_redirect(&self) {}
    fn record_callback_success(&self) {}
    fn record_failure(&self, _stage: &str, _kind: ErrorKind) {}
    fn record_token_exchange(&self, _duration: Duration, _success: bool) {}
    fn record_user_fetch(&self, _provider: &str, _duration: Duration, _success: bool) {}
}

/// No-op metrics singleton.
pub fn no_op_metrics() -> NoOpMetrics {
    NoOpMetrics
}

/// Metric entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub name: String,
    pub value: f64,
    pub labels: MetricLabels,
}

/// In-memory metrics for testing.
#[derive(Default)]
pub struct InMemoryMetrics {
    entries: Mutex<Vec<MetricEntry>>,
}

impl InMemoryMetrics {
    /// Create new in-memory metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded entries.
    pub fn get_entries(&self) -> Vec<MetricEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get entries by name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<MetricEntry> {
        self.get_entries()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }

    /// Number of entries recorded under `name`.
    pub fn count(&self, name: &str) -> usize {
        self.get_entries_by_name(name).len()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MetricEntry {
                name: name.to_string(),
                value,
                labels,
            });
    }
}

impl HandshakeMetrics for InMemoryMetrics {
    fn record_state_issued(&self) {
        self.record("oauth2_states_issued_total", 1.0, &[]);
    }

    fn record_login_redirect(&self) {
        self.record("oauth2_login_redirects_total", 1.0, &[]);
    }

    fn record_callback_success(&self) {
        self.record("oauth2_callbacks_total", 1.0, &[("outcome", "success")]);
    }

    fn record_failure(&self, stage: &str, kind: ErrorKind) {
        self.record(
            "oauth2_failures_total",
            1.0,
            &[("stage", stage), ("kind", kind.as_str())],
        );
    }

    fn record_token_exchange(&self, duration: Duration, success: bool) {
        let success = success.to_string();
        self.record(
            "oauth2_token_exchange_duration_ms",
            duration.as_secs_f64() * 1000.0,
            &[("success", &success)],
        );
    }

    fn record_user_fetch(&self, provider: &str, duration: Duration, success: bool) {
        let success = success.to_string();
        self.record(
            "oauth2_user_fetch_duration_ms",
            duration.as_secs_f64() * 1000.0,
            &[("provider", provider), ("success", &success)],
        );
    }
}

/// Create in-memory metrics for testing.
pub fn create_in_memory_metrics() -> InMemoryMetrics {
    InMemoryMetrics::new()
}
