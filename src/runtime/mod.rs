//! Runtime adapters, scheduling triggers, and reporting surface.

pub mod api;
pub mod scheduler;
pub mod tokio_spawner;

pub use api::{latest_health, recent_runs, status_report, trigger_manual_sync, StatusReport};
pub use scheduler::{spawn_schedules, ScheduleHandle};
pub use tokio_spawner::TokioSpawner;
