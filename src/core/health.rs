//! Health monitor: independent dependency checks on their own cadence.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::HealthConfig;
use crate::core::admission::{AdmissionQueue, Spawn};
use crate::core::alert::{build_alert, AlertKind};
use crate::core::error::StoreError;
use crate::core::model::{HealthSnapshot, LastSyncMarker};
use crate::core::orchestrator::Collaborators;
use crate::core::store::{self, HEALTH_CHECK_KEY, HEALTH_PROBE_KEY, LAST_SUCCESSFUL_SYNC_KEY};
use crate::util::clock::now_ms;

/// Name of the durable-store round-trip check.
pub const CHECK_STORE: &str = "store";
/// Name of the external API reachability check.
pub const CHECK_API: &str = "api";
/// Name of the last-successful-sync freshness check.
pub const CHECK_LAST_SYNC: &str = "lastSync";

/// Probes the store, the external API, and sync freshness.
pub struct HealthMonitor<S> {
    config: HealthConfig,
    queue: AdmissionQueue<S>,
    deps: Collaborators,
}

impl<S> HealthMonitor<S>
where
    S: Spawn,
{
    /// Create a monitor. API probes go through `queue` so they count against
    /// the same quota as sync traffic.
    pub const fn new(config: HealthConfig, queue: AdmissionQueue<S>, deps: Collaborators) -> Self {
        Self {
            config,
            queue,
            deps,
        }
    }

    /// Run every check, persist the snapshot, and alert if anything failed.
    ///
    /// A check that errors counts as `false`; this method always returns a
    /// snapshot.
    pub async fn run_checks(&self) -> HealthSnapshot {
        let mut checks = BTreeMap::new();
        checks.insert(CHECK_STORE.to_string(), self.check_store().await);
        checks.insert(CHECK_API.to_string(), self.check_api().await);
        checks.insert(CHECK_LAST_SYNC.to_string(), self.check_last_sync().await);

        let snapshot = HealthSnapshot::from_checks(checks);

        let ttl = Duration::from_secs(self.config.check_interval_secs);
        if let Err(e) =
            store::put_json(self.deps.store.as_ref(), HEALTH_CHECK_KEY, &snapshot, Some(ttl)).await
        {
            error!(error = %e, "failed to persist health snapshot");
        }

        if snapshot.healthy {
            info!("health check passed");
        } else {
            warn!(checks = ?snapshot.checks, "health check failed");
            self.deps.monitor.alert(build_alert(
                AlertKind::HealthCheckFailed,
                "health check failed",
                json!({ "checks": snapshot.checks, "timestampMs": snapshot.timestamp_ms }),
            ));
        }
        snapshot
    }

    async fn check_store(&self) -> bool {
        match self.store_round_trip().await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, "store health check errored");
                false
            }
        }
    }

    async fn store_round_trip(&self) -> Result<bool, StoreError> {
        let probe: Value = json!({ "probe": now_ms() });
        let ttl = Duration::from_secs(self.config.probe_ttl_secs);
        self.deps
            .store
            .put(HEALTH_PROBE_KEY, probe.clone(), Some(ttl))
            .await?;
        let read_back = self.deps.store.get(HEALTH_PROBE_KEY).await?;
        Ok(read_back.as_ref() == Some(&probe))
    }

    async fn check_api(&self) -> bool {
        let source = Arc::clone(&self.deps.source);
        let outcome = self
            .queue
            .enqueue(move || {
                let source = Arc::clone(&source);
                async move { source.probe().await }
            })
            .await;
        match outcome {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "api health check failed");
                false
            }
        }
    }

    async fn check_last_sync(&self) -> bool {
        let marker: Option<LastSyncMarker> =
            match store::get_json(self.deps.store.as_ref(), LAST_SUCCESSFUL_SYNC_KEY).await {
                Ok(marker) => marker,
                Err(e) => {
                    warn!(error = %e, "last-sync health check errored");
                    return false;
                }
            };
        let Some(marker) = marker else {
            debug!("no successful sync recorded yet");
            return false;
        };
        let age_ms = now_ms().saturating_sub(marker.completed_at_ms);
        let fresh = age_ms < self.config.max_sync_age_secs.saturating_mul(1000);
        debug!(age_ms, fresh, "last successful sync age");
        fresh
    }
}
