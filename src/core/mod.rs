//! Core admission, orchestration, and health abstractions.

pub mod account;
pub mod admission;
pub mod alert;
pub mod backoff;
pub mod error;
pub mod health;
pub mod model;
pub mod orchestrator;
pub mod rate_limit;
pub mod store;
pub mod window;

pub use account::{AccountData, AccountDataSource, AccountDirectory, ConnectedAccount};
pub use admission::{
    AdmissionHandle, AdmissionQueue, ApiResponse, QueueStats, QueueStatus,
    QueuedRequest, Spawn,
};
pub use alert::{
    build_alert, Alert, AlertKind, InMemoryMonitor, Monitor, RunDataPoint, TracingMonitor,
};
pub use backoff::BackoffPolicy;
pub use error::{AdmissionError, ApiError, AppResult, StoreError, SyncError};
pub use health::{HealthMonitor, CHECK_API, CHECK_LAST_SYNC, CHECK_STORE};
pub use model::{AccountSyncResult, HealthSnapshot, LastSyncMarker, RunStatus, SyncRun};
pub use orchestrator::{Collaborators, SyncOrchestrator};
pub use rate_limit::RateLimitHeaders;
pub use store::StateStore;
pub use window::RateWindow;
