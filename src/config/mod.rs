//! Configuration models for admission, orchestration, health, and scheduling.

pub mod engine;

pub use engine::{
    AdmissionConfig, EngineConfig, Environment, HealthConfig, ScheduleConfig, SyncConfig,
};
