//! Durable key/value state store abstraction and well-known keys.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::core::error::StoreError;

/// Prefix for persisted [`SyncRun`](crate::core::SyncRun) records.
pub const SYNC_RESULT_PREFIX: &str = "sync-result-";
/// Key of the latest [`HealthSnapshot`](crate::core::HealthSnapshot).
pub const HEALTH_CHECK_KEY: &str = "health-check";
/// Key of the [`LastSyncMarker`](crate::core::LastSyncMarker).
pub const LAST_SUCCESSFUL_SYNC_KEY: &str = "last-successful-sync";
/// Scratch key written and read back by the store health check.
pub const HEALTH_PROBE_KEY: &str = "health-check-probe";

/// Externally synchronized key/value store with per-key expiry.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Write `value` under `key`, expiring after `ttl` if given.
    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), StoreError>;
    /// Read a live value.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    /// Live keys starting with `prefix`, in ascending key order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Serialize `value` and store it.
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), StoreError> {
    let encoded = serde_json::to_value(value)?;
    store.put(key, encoded, ttl).await
}

/// Read and deserialize a value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}
