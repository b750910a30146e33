//! Builder that wires the admission queue, orchestrator, and health monitor.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::{AdmissionQueue, Collaborators, HealthMonitor, Spawn, SyncError, SyncOrchestrator};

/// Fully wired engine. The orchestrator and the health monitor share one
/// admission queue, so all upstream traffic counts against one window.
pub struct Engine<S> {
    /// Validated configuration the engine was built from.
    pub config: EngineConfig,
    /// Shared admission queue.
    pub queue: AdmissionQueue<S>,
    /// Sync orchestrator.
    pub orchestrator: Arc<SyncOrchestrator<S>>,
    /// Health monitor.
    pub health: Arc<HealthMonitor<S>>,
}

/// Build an engine from configuration and collaborators.
///
/// # Errors
///
/// Returns [`SyncError::InvalidConfig`] if `cfg` fails validation.
pub fn build_engine<S>(
    cfg: EngineConfig,
    deps: Collaborators,
    spawner: S,
) -> Result<Engine<S>, SyncError>
where
    S: Spawn + Clone,
{
    cfg.validate().map_err(SyncError::InvalidConfig)?;

    let queue = AdmissionQueue::new(cfg.admission.clone(), spawner);
    let orchestrator = SyncOrchestrator::new(cfg.sync.clone(), queue.clone(), deps.clone());
    let health = HealthMonitor::new(cfg.health.clone(), queue.clone(), deps);

    tracing::info!(environment = ?cfg.environment, "sync engine built");

    Ok(Engine {
        config: cfg,
        queue,
        orchestrator: Arc::new(orchestrator),
        health: Arc::new(health),
    })
}
