//! Engine configuration structures.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const HOUR_SECS: u64 = 60 * 60;
const DAY_SECS: u64 = 24 * HOUR_SECS;

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "QUOTA_SYNC_";

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Pre-production.
    Staging,
    /// Production. Manual sync triggers are refused.
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment `{other}`")),
        }
    }
}

/// Admission queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Requests admitted per fixed window.
    pub max_requests_per_window: u32,
    /// Window length in milliseconds.
    pub window_duration_ms: u64,
    /// Minimum delay between successive dispatches.
    pub request_delay_ms: u64,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_backoff_ms: u64,
    /// Upper bound for a single retry delay.
    pub max_backoff_ms: u64,
    /// Remaining/limit ratio below which the next dispatch is slowed.
    pub low_quota_ratio: f64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 180,
            window_duration_ms: 15 * 60 * 1000,
            request_delay_ms: 1000,
            max_retries: 3,
            base_backoff_ms: 1000,
            max_backoff_ms: 60_000,
            low_quota_ratio: 0.15,
        }
    }
}

impl AdmissionConfig {
    /// Validate admission values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests_per_window == 0 {
            return Err("max_requests_per_window must be greater than 0".into());
        }
        if self.window_duration_ms == 0 {
            return Err("window_duration_ms must be greater than 0".into());
        }
        if self.base_backoff_ms == 0 {
            return Err("base_backoff_ms must be greater than 0".into());
        }
        if self.max_backoff_ms < self.base_backoff_ms {
            return Err("max_backoff_ms must not be less than base_backoff_ms".into());
        }
        if !(0.0..=1.0).contains(&self.low_quota_ratio) {
            return Err("low_quota_ratio must be within 0.0..=1.0".into());
        }
        Ok(())
    }
}

/// Sync orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Failed/total ratio above which a high-failure alert is raised.
    pub alert_threshold: f64,
    /// Hard limit on a run's account loop. `None` disables it.
    pub run_deadline_secs: Option<u64>,
    /// Retention of persisted run records.
    pub result_ttl_secs: u64,
    /// Retention of the last-successful-sync marker.
    pub last_sync_ttl_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 0.2,
            run_deadline_secs: Some(23 * HOUR_SECS),
            result_ttl_secs: 30 * DAY_SECS,
            last_sync_ttl_secs: 7 * DAY_SECS,
        }
    }
}

impl SyncConfig {
    /// Validate orchestrator values.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.alert_threshold) {
            return Err("alert_threshold must be within 0.0..=1.0".into());
        }
        if self.run_deadline_secs == Some(0) {
            return Err("run_deadline_secs must be greater than 0 when set".into());
        }
        if self.result_ttl_secs == 0 || self.last_sync_ttl_secs == 0 {
            return Err("retention periods must be greater than 0".into());
        }
        Ok(())
    }

    /// Run deadline as a duration.
    #[must_use]
    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }
}

/// Health monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Check cadence; also the snapshot TTL.
    pub check_interval_secs: u64,
    /// Maximum age of the last successful sync for the freshness check.
    pub max_sync_age_secs: u64,
    /// TTL of the scratch value written by the store check.
    pub probe_ttl_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 6 * HOUR_SECS,
            max_sync_age_secs: 25 * HOUR_SECS,
            probe_ttl_secs: 60,
        }
    }
}

impl HealthConfig {
    /// Validate health values.
    pub fn validate(&self) -> Result<(), String> {
        if self.check_interval_secs == 0 {
            return Err("check_interval_secs must be greater than 0".into());
        }
        if self.max_sync_age_secs == 0 {
            return Err("max_sync_age_secs must be greater than 0".into());
        }
        if self.probe_ttl_secs == 0 {
            return Err("probe_ttl_secs must be greater than 0".into());
        }
        Ok(())
    }
}

/// Trigger cadence for the built-in scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Interval between sync runs.
    pub sync_interval_secs: u64,
    /// Interval between health check passes.
    pub health_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: DAY_SECS,
            health_interval_secs: 6 * HOUR_SECS,
        }
    }
}

impl ScheduleConfig {
    /// Validate schedule values.
    pub fn validate(&self) -> Result<(), String> {
        if self.sync_interval_secs == 0 || self.health_interval_secs == 0 {
            return Err("schedule intervals must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Admission queue settings.
    pub admission: AdmissionConfig,
    /// Orchestrator settings.
    pub sync: SyncConfig,
    /// Health monitor settings.
    pub health: HealthConfig,
    /// Scheduler settings.
    pub schedule: ScheduleConfig,
}

impl EngineConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.admission
            .validate()
            .map_err(|e| format!("admission: {e}"))?;
        self.sync.validate().map_err(|e| format!("sync: {e}"))?;
        self.health.validate().map_err(|e| format!("health: {e}"))?;
        self.schedule
            .validate()
            .map_err(|e| format!("schedule: {e}"))?;
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` if present, then apply `QUOTA_SYNC_*` variables over the
    /// defaults and validate.
    pub fn from_env() -> Result<Self, String> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(format!("failed to load .env: {e}"));
            }
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let read = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        apply(&read, "ENVIRONMENT", &mut cfg.environment)?;

        let a = &mut cfg.admission;
        apply(&read, "MAX_REQUESTS_PER_WINDOW", &mut a.max_requests_per_window)?;
        apply(&read, "WINDOW_DURATION_MS", &mut a.window_duration_ms)?;
        apply(&read, "REQUEST_DELAY_MS", &mut a.request_delay_ms)?;
        apply(&read, "MAX_RETRIES", &mut a.max_retries)?;
        apply(&read, "BASE_BACKOFF_MS", &mut a.base_backoff_ms)?;
        apply(&read, "MAX_BACKOFF_MS", &mut a.max_backoff_ms)?;
        apply(&read, "LOW_QUOTA_RATIO", &mut a.low_quota_ratio)?;

        let s = &mut cfg.sync;
        apply(&read, "ALERT_THRESHOLD", &mut s.alert_threshold)?;
        apply(&read, "RESULT_TTL_SECS", &mut s.result_ttl_secs)?;
        apply(&read, "LAST_SYNC_TTL_SECS", &mut s.last_sync_ttl_secs)?;
        if let Some(raw) = read("RUN_DEADLINE_SECS") {
            s.run_deadline_secs = match raw.trim() {
                "" | "none" | "off" => None,
                value => Some(parse_value("RUN_DEADLINE_SECS", value)?),
            };
        }

        let h = &mut cfg.health;
        apply(&read, "CHECK_INTERVAL_SECS", &mut h.check_interval_secs)?;
        apply(&read, "MAX_SYNC_AGE_SECS", &mut h.max_sync_age_secs)?;
        apply(&read, "PROBE_TTL_SECS", &mut h.probe_ttl_secs)?;

        let sc = &mut cfg.schedule;
        apply(&read, "SYNC_INTERVAL_SECS", &mut sc.sync_interval_secs)?;
        apply(&read, "HEALTH_INTERVAL_SECS", &mut sc.health_interval_secs)?;

        cfg.validate()?;
        Ok(cfg)
    }
}

fn apply<T, R>(read: &R, suffix: &str, target: &mut T) -> Result<(), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    R: Fn(&str) -> Option<String>,
{
    if let Some(raw) = read(suffix) {
        *target = parse_value(suffix, &raw)?;
    }
    Ok(())
}

fn parse_value<T>(suffix: &str, raw: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| format!("{ENV_PREFIX}{suffix}: {e}"))
}
