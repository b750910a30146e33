//! Sync orchestrator: one pass over every connected account.
//!
//! Accounts are processed strictly one after another. Each fetch goes
//! through the shared [`AdmissionQueue`], so the queue's window and pacing
//! bound the run's total API usage. A failed account is recorded and the run
//! moves on; only failures before the account loop abort the run.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::core::account::{AccountDataSource, AccountDirectory, ConnectedAccount};
use crate::core::admission::{AdmissionQueue, Spawn};
use crate::core::alert::{build_alert, AlertKind, Monitor, RunDataPoint};
use crate::core::error::SyncError;
use crate::core::model::{AccountSyncResult, LastSyncMarker, RunStatus, SyncRun};
use crate::core::store::{self, StateStore, LAST_SUCCESSFUL_SYNC_KEY};
use crate::util::clock::now_ms;

/// External collaborators used by the orchestrator and the health monitor.
#[derive(Clone)]
pub struct Collaborators {
    /// Connected account listing.
    pub directory: Arc<dyn AccountDirectory>,
    /// Wrapped external API.
    pub source: Arc<dyn AccountDataSource>,
    /// Durable key/value store.
    pub store: Arc<dyn StateStore>,
    /// Alert and metrics sink.
    pub monitor: Arc<dyn Monitor>,
}

/// Runs full synchronization passes.
pub struct SyncOrchestrator<S> {
    config: SyncConfig,
    queue: AdmissionQueue<S>,
    deps: Collaborators,
}

impl<S> SyncOrchestrator<S>
where
    S: Spawn,
{
    /// Create an orchestrator sharing `queue` with any other API caller.
    pub const fn new(config: SyncConfig, queue: AdmissionQueue<S>, deps: Collaborators) -> Self {
        Self {
            config,
            queue,
            deps,
        }
    }

    /// The admission queue this orchestrator dispatches through.
    pub const fn queue(&self) -> &AdmissionQueue<S> {
        &self.queue
    }

    /// Run one synchronization pass and persist its record.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Fatal`] when the run cannot start (the account
    /// directory or the store is unreachable). The catastrophic run is
    /// recorded before returning.
    pub async fn run(&self) -> Result<SyncRun, SyncError> {
        let mut run = SyncRun::new();
        let clock = Instant::now();
        run.status = RunStatus::Running;
        info!(run_id = %run.id, "sync run started");

        let prepared = self.prepare(&run).await;
        let accounts = match prepared {
            Ok(accounts) => accounts,
            Err(message) => return Err(self.fail(run, clock, message).await),
        };

        run.total_accounts = u32::try_from(accounts.len()).unwrap_or(u32::MAX);
        if accounts.is_empty() {
            info!(run_id = %run.id, "no connected accounts, nothing to sync");
        }

        let deadline = self.config.run_deadline().map(|d| clock + d);
        for (index, account) in accounts.iter().enumerate() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                let skipped = accounts.len() - index;
                warn!(run_id = %run.id, skipped, "run deadline exceeded");
                run.errors.push(format!(
                    "run deadline exceeded: {skipped} accounts not processed"
                ));
                break;
            }
            let result = self.sync_account(account).await;
            run.record(result);
        }

        run.status = RunStatus::Completed;
        Self::finish(&mut run, clock);
        self.complete(&run).await;
        Ok(run)
    }

    /// Everything that must succeed before the account loop starts.
    async fn prepare(&self, run: &SyncRun) -> Result<Vec<ConnectedAccount>, String> {
        let previous: Option<LastSyncMarker> =
            store::get_json(self.deps.store.as_ref(), LAST_SUCCESSFUL_SYNC_KEY)
                .await
                .map_err(|e| format!("state store unreachable: {e}"))?;
        if let Some(marker) = previous {
            let hours = now_ms().saturating_sub(marker.completed_at_ms) / crate::util::HOUR_MS;
            info!(run_id = %run.id, hours_since_last_success = hours, "previous successful sync found");
        }

        self.deps
            .directory
            .list_connected_accounts()
            .await
            .map_err(|e| format!("failed to list connected accounts: {e:#}"))
    }

    /// Fetch one account through the admission queue. Never fails the run.
    async fn sync_account(&self, account: &ConnectedAccount) -> AccountSyncResult {
        let source = Arc::clone(&self.deps.source);
        let target = account.clone();
        let outcome = self
            .queue
            .enqueue(move || {
                let source = Arc::clone(&source);
                let target = target.clone();
                async move { source.fetch_account_data(&target).await }
            })
            .await;

        match outcome {
            Ok(data) => {
                info!(
                    account_id = %account.id,
                    items = data.items_processed,
                    "account synced"
                );
                AccountSyncResult::succeeded(&account.id, data.items_processed)
            }
            Err(e) => {
                warn!(account_id = %account.id, error = %e, "account sync failed");
                AccountSyncResult::failed(&account.id, e.to_string())
            }
        }
    }

    fn finish(run: &mut SyncRun, clock: Instant) {
        run.completed_at_ms = now_ms();
        run.duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
    }

    async fn complete(&self, run: &SyncRun) {
        self.persist(run).await;

        if run.counts_as_success() {
            let marker = LastSyncMarker {
                run_id: run.id,
                completed_at_ms: run.completed_at_ms,
            };
            let ttl = Duration::from_secs(self.config.last_sync_ttl_secs);
            if let Err(e) = store::put_json(
                self.deps.store.as_ref(),
                LAST_SUCCESSFUL_SYNC_KEY,
                &marker,
                Some(ttl),
            )
            .await
            {
                error!(run_id = %run.id, error = %e, "failed to write last-successful-sync marker");
            }
        }

        self.deps.monitor.data_point(RunDataPoint {
            run_id: run.id,
            total_accounts: run.total_accounts,
            successful_accounts: run.successful_accounts,
            failed_accounts: run.failed_accounts,
            total_items_processed: run.total_items_processed,
            duration_ms: run.duration_ms,
        });

        let ratio = run.failure_ratio();
        if ratio > self.config.alert_threshold {
            self.deps.monitor.alert(build_alert(
                AlertKind::HighFailureRate,
                format!(
                    "sync run {} failed {}/{} accounts",
                    run.id, run.failed_accounts, run.total_accounts
                ),
                json!({
                    "runId": run.id,
                    "failedAccounts": run.failed_accounts,
                    "totalAccounts": run.total_accounts,
                    "failureRatio": ratio,
                    "errors": run.errors,
                }),
            ));
        }

        info!(
            run_id = %run.id,
            total = run.total_accounts,
            successful = run.successful_accounts,
            failed = run.failed_accounts,
            items = run.total_items_processed,
            duration_ms = run.duration_ms,
            "sync run completed"
        );
    }

    /// Record a catastrophic run and build the error signalled to the caller.
    async fn fail(&self, mut run: SyncRun, clock: Instant, message: String) -> SyncError {
        error!(run_id = %run.id, error = %message, "sync run failed before processing accounts");
        run.status = RunStatus::Failed;
        run.total_accounts = 0;
        run.processed_accounts = 0;
        run.successful_accounts = 0;
        run.failed_accounts = 0;
        run.errors = vec![message.clone()];
        Self::finish(&mut run, clock);

        self.persist(&run).await;
        self.deps.monitor.alert(build_alert(
            AlertKind::SyncFailed,
            format!("sync run {} completely failed: {message}", run.id),
            json!({ "runId": run.id, "error": message }),
        ));

        SyncError::Fatal {
            message,
            run: Box::new(run),
        }
    }

    async fn persist(&self, run: &SyncRun) {
        let ttl = Duration::from_secs(self.config.result_ttl_secs);
        if let Err(e) =
            store::put_json(self.deps.store.as_ref(), &run.storage_key(), run, Some(ttl)).await
        {
            error!(run_id = %run.id, error = %e, "failed to persist sync run");
        }
    }
}
