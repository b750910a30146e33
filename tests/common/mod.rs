//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use quota_sync::config::{AdmissionConfig, EngineConfig, HealthConfig, SyncConfig};
use quota_sync::core::{
    AccountData, AccountDataSource, AccountDirectory, AdmissionQueue, ApiError, ApiResponse,
    AppResult, Collaborators, ConnectedAccount, HealthMonitor, InMemoryMonitor, StateStore,
    StoreError, SyncOrchestrator,
};
use quota_sync::infra::store::InMemoryStore;
use quota_sync::runtime::TokioSpawner;
use quota_sync::util::init_tracing;

/// Admission settings that never get in the way of functional tests.
pub fn fast_admission() -> AdmissionConfig {
    AdmissionConfig {
        max_requests_per_window: 1000,
        window_duration_ms: 1000,
        request_delay_ms: 0,
        max_retries: 3,
        ..AdmissionConfig::default()
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        admission: fast_admission(),
        sync: SyncConfig::default(),
        health: HealthConfig::default(),
        ..EngineConfig::default()
    }
}

pub fn accounts(n: usize) -> Vec<ConnectedAccount> {
    (1..=n)
        .map(|i| ConnectedAccount::new(format!("acct-{i}"), format!("ext-{i}")))
        .collect()
}

/// Directory returning a fixed list.
pub struct StaticDirectory(pub Vec<ConnectedAccount>);

#[async_trait]
impl AccountDirectory for StaticDirectory {
    async fn list_connected_accounts(&self) -> AppResult<Vec<ConnectedAccount>> {
        Ok(self.0.clone())
    }
}

/// Directory whose backing service is down.
pub struct BrokenDirectory;

#[async_trait]
impl AccountDirectory for BrokenDirectory {
    async fn list_connected_accounts(&self) -> AppResult<Vec<ConnectedAccount>> {
        Err(anyhow::anyhow!("account database unreachable"))
    }
}

/// Upstream API fake with per-account failures and call tracking.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    pub failing: Arc<HashSet<String>>,
    pub items_per_account: u64,
    pub latency: Duration,
    pub probe_fails: bool,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(items_per_account: u64) -> Self {
        Self {
            items_per_account,
            ..Self::default()
        }
    }

    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.failing = Arc::new(ids.iter().map(|s| (*s).to_string()).collect());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failing_probe(mut self) -> Self {
        self.probe_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountDataSource for ScriptedSource {
    async fn fetch_account_data(
        &self,
        account: &ConnectedAccount,
    ) -> Result<ApiResponse<AccountData>, ApiError> {
        self.calls.lock().unwrap().push(account.id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&account.id) {
            return Err(ApiError::from_status(403, "account suspended", None));
        }
        Ok(ApiResponse::new(AccountData {
            items_processed: self.items_per_account,
        }))
    }

    async fn probe(&self) -> Result<ApiResponse<()>, ApiError> {
        if self.probe_fails {
            return Err(ApiError::from_status(401, "token revoked", None));
        }
        Ok(ApiResponse::new(()))
    }
}

/// Store that rejects every operation.
pub struct UnavailableStore;

#[async_trait]
impl StateStore for UnavailableStore {
    async fn put(&self, _key: &str, _value: Value, _ttl: Option<Duration>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn list(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Wired test harness with handles to every fake.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub monitor: Arc<InMemoryMonitor>,
    pub source: ScriptedSource,
    pub deps: Collaborators,
    pub queue: AdmissionQueue<TokioSpawner>,
}

impl Harness {
    pub fn new(directory: impl AccountDirectory + 'static, source: ScriptedSource) -> Self {
        Self::with_admission(directory, source, fast_admission())
    }

    pub fn with_admission(
        directory: impl AccountDirectory + 'static,
        source: ScriptedSource,
        admission: AdmissionConfig,
    ) -> Self {
        init_tracing();
        let store = Arc::new(InMemoryStore::new());
        let monitor = Arc::new(InMemoryMonitor::new(100));
        let deps = Collaborators {
            directory: Arc::new(directory),
            source: Arc::new(source.clone()),
            store: store.clone(),
            monitor: monitor.clone(),
        };
        let queue = AdmissionQueue::new(admission, TokioSpawner::current());
        Self {
            store,
            monitor,
            source,
            deps,
            queue,
        }
    }

    pub fn orchestrator(&self, sync: SyncConfig) -> SyncOrchestrator<TokioSpawner> {
        SyncOrchestrator::new(sync, self.queue.clone(), self.deps.clone())
    }

    pub fn health(&self, health: HealthConfig) -> HealthMonitor<TokioSpawner> {
        HealthMonitor::new(health, self.queue.clone(), self.deps.clone())
    }
}
