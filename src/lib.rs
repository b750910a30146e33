//! # Quota Sync
//!
//! Quota-aware request admission and multi-account synchronization for
//! third-party APIs that enforce strict, time-windowed request quotas.
//!
//! The crate keeps a multi-tenant set of connected accounts synchronized on a
//! daily cadence without exceeding the upstream quota, and without letting one
//! account's failure abort the whole run.
//!
//! ## Components
//!
//! - **Admission Queue** ([`core::AdmissionQueue`]): single gatekeeper for
//!   every upstream call. Admits work in FIFO order, caps dispatches per fixed
//!   window, paces successive calls, and retries throttled or transient
//!   failures with exponential backoff.
//! - **Sync Orchestrator** ([`core::SyncOrchestrator`]): iterates connected
//!   accounts sequentially through the queue, isolates per-account failures,
//!   persists one [`core::SyncRun`] per invocation, and alerts when the
//!   failure ratio crosses a threshold.
//! - **Health Monitor** ([`core::HealthMonitor`]): probes the durable store,
//!   the upstream API, and sync freshness on its own cadence and persists a
//!   [`core::HealthSnapshot`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quota_sync::builders::build_engine;
//! use quota_sync::config::EngineConfig;
//! use quota_sync::core::{Collaborators, TracingMonitor};
//! use quota_sync::infra::store::FileStore;
//! use quota_sync::runtime::{spawn_schedules, TokioSpawner};
//!
//! let cfg = EngineConfig::from_env()?;
//! let deps = Collaborators {
//!     directory: Arc::new(my_directory),
//!     source: Arc::new(my_api_client),
//!     store: Arc::new(FileStore::open("./state", "quota-sync")?),
//!     monitor: Arc::new(TracingMonitor),
//! };
//! let engine = build_engine(cfg, deps, TokioSpawner::current())?;
//! let schedules = spawn_schedules(
//!     Arc::clone(&engine.orchestrator),
//!     Arc::clone(&engine.health),
//!     &engine.config.schedule,
//! );
//! ```
//!
//! The window state is process-local. Running more than one engine instance
//! against the same upstream quota does not enforce the quota globally.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core admission, orchestration, and health abstractions.
pub mod core;
/// Configuration models for admission, orchestration, health, and schedules.
pub mod config;
/// Builders to construct engine components from configuration.
pub mod builders;
/// Infrastructure adapters for durable state.
pub mod infra;
/// Runtime adapters, triggers, and the reporting surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
