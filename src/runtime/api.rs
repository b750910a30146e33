//! Read-only reporting views and the manual trigger entry point.

use serde::{Deserialize, Serialize};

use crate::config::Environment;
use crate::core::store::{self, StateStore, HEALTH_CHECK_KEY, SYNC_RESULT_PREFIX};
use crate::core::{HealthSnapshot, Spawn, StoreError, SyncError, SyncOrchestrator, SyncRun};

/// Combined payload for the reporting layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Most recent runs first.
    pub recent_runs: Vec<SyncRun>,
    /// Latest unexpired health snapshot.
    pub latest_health: Option<HealthSnapshot>,
}

/// Persisted runs, most recent first, at most `limit` of them.
///
/// # Errors
///
/// Propagates store failures and undecodable records.
pub async fn recent_runs(store: &dyn StateStore, limit: usize) -> Result<Vec<SyncRun>, StoreError> {
    let keys = store.list(SYNC_RESULT_PREFIX).await?;
    let mut runs = Vec::with_capacity(keys.len());
    for key in keys {
        // a key can expire between list and get
        if let Some(run) = store::get_json::<SyncRun>(store, &key).await? {
            runs.push(run);
        }
    }
    runs.sort_by(|a, b| b.started_at_ms.cmp(&a.started_at_ms));
    runs.truncate(limit);
    Ok(runs)
}

/// Latest health snapshot, if one has not expired.
///
/// # Errors
///
/// Propagates store failures and undecodable records.
pub async fn latest_health(store: &dyn StateStore) -> Result<Option<HealthSnapshot>, StoreError> {
    store::get_json(store, HEALTH_CHECK_KEY).await
}

/// Build the combined status report.
///
/// # Errors
///
/// Propagates store failures.
pub async fn status_report(
    store: &dyn StateStore,
    limit: usize,
) -> Result<StatusReport, StoreError> {
    Ok(StatusReport {
        recent_runs: recent_runs(store, limit).await?,
        latest_health: latest_health(store).await?,
    })
}

/// Run a sync out of band. Refused in production.
///
/// # Errors
///
/// Returns [`SyncError::ManualTriggerDisabled`] in production, otherwise
/// whatever [`SyncOrchestrator::run`] returns.
pub async fn trigger_manual_sync<S>(
    orchestrator: &SyncOrchestrator<S>,
    environment: Environment,
) -> Result<SyncRun, SyncError>
where
    S: Spawn,
{
    if environment == Environment::Production {
        tracing::warn!("manual sync trigger refused in production");
        return Err(SyncError::ManualTriggerDisabled);
    }
    tracing::info!(environment = ?environment, "manual sync triggered");
    orchestrator.run().await
}
