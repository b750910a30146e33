//! Collaborator traits for the account directory and the external data API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::admission::ApiResponse;
use crate::core::error::{ApiError, AppResult};

/// A connected account as listed by the account directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAccount {
    /// Internal account identifier.
    pub id: String,
    /// Identifier of the account on the external platform.
    pub external_id: String,
}

impl ConnectedAccount {
    /// Convenience constructor.
    pub fn new(id: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external_id: external_id.into(),
        }
    }
}

/// Data pulled for one account in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    /// Number of items (posts, metrics rows, ...) processed for the account.
    pub items_processed: u64,
}

/// Source of the connected account list.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// List every account that should be synchronized.
    async fn list_connected_accounts(&self) -> AppResult<Vec<ConnectedAccount>>;
}

/// The wrapped external API.
///
/// Implementations perform exactly one upstream request per call and report
/// failures as [`ApiError`] variants so the admission queue can classify
/// them. Retries and pacing are the queue's job, not the implementation's.
#[async_trait]
pub trait AccountDataSource: Send + Sync {
    /// Fetch and process one account's data.
    async fn fetch_account_data(
        &self,
        account: &ConnectedAccount,
    ) -> Result<ApiResponse<AccountData>, ApiError>;

    /// Lightweight authenticated request used by health checks.
    async fn probe(&self) -> Result<ApiResponse<()>, ApiError>;
}
