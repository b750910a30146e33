//! Alert and monitoring sinks.
//!
//! Provides a tracing-backed sink for production and a bounded in-memory sink
//! for testing and dev.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::util::clock::now_ms;

/// Kind of condition an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A run's failed/total ratio crossed the alert threshold.
    HighFailureRate,
    /// A run failed before processing any account.
    SyncFailed,
    /// At least one health check returned false.
    HealthCheckFailed,
}

/// Alert raised by the orchestrator or the health monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert kind.
    pub kind: AlertKind,
    /// Human-readable summary.
    pub message: String,
    /// Structured context (counts, per-check breakdown, ...).
    pub details: Value,
    /// Timestamp milliseconds.
    pub created_at_ms: u64,
}

/// Monitoring data point emitted once per completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDataPoint {
    /// Run identifier.
    pub run_id: Uuid,
    /// Accounts listed.
    pub total_accounts: u32,
    /// Accounts fetched successfully.
    pub successful_accounts: u32,
    /// Accounts that failed.
    pub failed_accounts: u32,
    /// Items processed.
    pub total_items_processed: u64,
    /// Run duration.
    pub duration_ms: u64,
}

/// Sink abstraction for alerts and run metrics.
///
/// Both calls are fire-and-forget: implementations must not block and must
/// swallow their own delivery failures.
pub trait Monitor: Send + Sync {
    /// Deliver an alert.
    fn alert(&self, alert: Alert);
    /// Record a run data point.
    fn data_point(&self, point: RunDataPoint);
}

/// Monitor that writes alerts and data points to the tracing pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

impl Monitor for TracingMonitor {
    fn alert(&self, alert: Alert) {
        tracing::error!(
            kind = ?alert.kind,
            details = %alert.details,
            "ALERT: {}",
            alert.message
        );
    }

    fn data_point(&self, point: RunDataPoint) {
        tracing::info!(
            run_id = %point.run_id,
            total = point.total_accounts,
            successful = point.successful_accounts,
            failed = point.failed_accounts,
            items = point.total_items_processed,
            duration_ms = point.duration_ms,
            "sync run metrics"
        );
    }
}

/// In-memory monitor for testing and dev.
pub struct InMemoryMonitor {
    alerts: Mutex<VecDeque<Alert>>,
    points: Mutex<VecDeque<RunDataPoint>>,
    max_events: usize,
}

impl InMemoryMonitor {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(max_events)),
            points: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored alerts.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().iter().cloned().collect()
    }

    /// Alerts of one kind.
    pub fn alerts_of(&self, kind: AlertKind) -> Vec<Alert> {
        self.alerts
            .lock()
            .iter()
            .filter(|a| a.kind == kind)
            .cloned()
            .collect()
    }

    /// Retrieve a snapshot of stored data points.
    pub fn data_points(&self) -> Vec<RunDataPoint> {
        self.points.lock().iter().cloned().collect()
    }

    fn push_bounded<T>(buffer: &Mutex<VecDeque<T>>, max: usize, item: T) {
        let mut buffer = buffer.lock();
        if buffer.len() >= max {
            buffer.pop_front();
        }
        buffer.push_back(item);
    }
}

impl Monitor for InMemoryMonitor {
    fn alert(&self, alert: Alert) {
        Self::push_bounded(&self.alerts, self.max_events, alert);
    }

    fn data_point(&self, point: RunDataPoint) {
        Self::push_bounded(&self.points, self.max_events, point);
    }
}

/// Helper to build an alert from context.
pub fn build_alert(kind: AlertKind, message: impl Into<String>, details: Value) -> Alert {
    Alert {
        kind,
        message: message.into(),
        details,
        created_at_ms: now_ms(),
    }
}
