//! Records produced by sync runs and health checks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::clock::now_ms;

/// Lifecycle of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet started.
    Pending,
    /// Iterating accounts.
    Running,
    /// Finished the account loop.
    Completed,
    /// Failed before the account loop.
    Failed,
}

/// Durable summary of one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    /// Run identifier.
    pub id: Uuid,
    /// Current lifecycle state.
    pub status: RunStatus,
    /// Start time, ms since epoch.
    pub started_at_ms: u64,
    /// Completion time, ms since epoch. Zero while running.
    pub completed_at_ms: u64,
    /// Accounts listed at the start of the run.
    pub total_accounts: u32,
    /// Accounts whose fetch settled.
    pub processed_accounts: u32,
    /// Accounts fetched successfully.
    pub successful_accounts: u32,
    /// Accounts whose fetch failed.
    pub failed_accounts: u32,
    /// Items fetched across all successful accounts.
    pub total_items_processed: u64,
    /// Per-account and fatal error messages, in the order they occurred.
    pub errors: Vec<String>,
    /// Wall time of the run.
    pub duration_ms: u64,
}

impl SyncRun {
    /// A fresh pending run.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: RunStatus::Pending,
            started_at_ms: now_ms(),
            completed_at_ms: 0,
            total_accounts: 0,
            processed_accounts: 0,
            successful_accounts: 0,
            failed_accounts: 0,
            total_items_processed: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Fold one account outcome into the counters.
    pub fn record(&mut self, result: AccountSyncResult) {
        self.processed_accounts += 1;
        if result.success {
            self.successful_accounts += 1;
            self.total_items_processed += result.items_processed;
        } else {
            self.failed_accounts += 1;
            let message = result.error.unwrap_or_else(|| "unknown error".into());
            self.errors.push(format!("{}: {}", result.account_id, message));
        }
    }

    /// Share of listed accounts that failed; zero for an empty run.
    #[must_use]
    pub fn failure_ratio(&self) -> f64 {
        if self.total_accounts == 0 {
            return 0.0;
        }
        f64::from(self.failed_accounts) / f64::from(self.total_accounts)
    }

    /// Whether this run should refresh the last-successful-sync marker.
    #[must_use]
    pub const fn counts_as_success(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
            && (self.total_accounts == 0 || self.successful_accounts > 0)
    }

    /// Storage key for this run.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}{}", crate::core::store::SYNC_RESULT_PREFIX, self.id)
    }
}

impl Default for SyncRun {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one account inside a run. Folded into [`SyncRun`] and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSyncResult {
    /// Account identifier.
    pub account_id: String,
    /// Items fetched.
    pub items_processed: u64,
    /// Whether the fetch succeeded.
    pub success: bool,
    /// Failure detail.
    pub error: Option<String>,
}

impl AccountSyncResult {
    /// Successful fetch.
    pub fn succeeded(account_id: impl Into<String>, items_processed: u64) -> Self {
        Self {
            account_id: account_id.into(),
            items_processed,
            success: true,
            error: None,
        }
    }

    /// Failed fetch.
    pub fn failed(account_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            items_processed: 0,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Composite result of one health check pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// When the checks ran, ms since epoch.
    pub timestamp_ms: u64,
    /// Per-check results keyed by check name.
    pub checks: BTreeMap<String, bool>,
    /// Logical AND of every check.
    pub healthy: bool,
}

impl HealthSnapshot {
    /// Build a snapshot from check results.
    #[must_use]
    pub fn from_checks(checks: BTreeMap<String, bool>) -> Self {
        let healthy = checks.values().all(|ok| *ok);
        Self {
            timestamp_ms: now_ms(),
            checks,
            healthy,
        }
    }
}

/// Marker written after a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSyncMarker {
    /// Run that wrote the marker.
    pub run_id: Uuid,
    /// When that run completed, ms since epoch.
    pub completed_at_ms: u64,
}
