//! Scheduler configuration.
//!
//! All fields have defaults, so a config file only needs to name what it
//! overrides. Durations are stored as plain integers to keep the file format
//! obvious; use the accessor methods to get `Duration`s.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

/// What `LockManager::release` does with the lock entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReleaseMode {
    /// Delete the key whoever holds it.
    #[default]
    Unconditional,
    /// Delete only if the stored token is still ours.
    OwnerChecked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of concurrent worker loops.
    pub workers: usize,
    /// Capacity of the in-process dispatch channel.
    pub channel_capacity: usize,
    pub feeder_tick_ms: u64,
    /// Per-lane wait on the fast path before treating it as empty.
    pub pop_timeout_ms: u64,
    /// How many pending tasks one fallback poll reads from the durable store.
    pub fallback_batch: usize,
    /// Priorities at or above this go to the high lane.
    pub high_priority_threshold: i32,
    pub lock_ttl_secs: u64,
    pub lock_release: LockReleaseMode,
    pub task_cache_ttl_secs: u64,
    pub counter_ttl_secs: u64,
    pub cleaner_interval_secs: u64,
    pub health_interval_secs: u64,
    /// Terminal tasks older than this are pruned by the cleaner. `None` keeps everything.
    pub retention_days: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            channel_capacity: 100,
            feeder_tick_ms: 100,
            pop_timeout_ms: 250,
            fallback_batch: 10,
            high_priority_threshold: 5,
            lock_ttl_secs: 5 * 60,
            lock_release: LockReleaseMode::Unconditional,
            task_cache_ttl_secs: 60 * 60,
            counter_ttl_secs: 25 * 60 * 60,
            cleaner_interval_secs: 60 * 60,
            health_interval_secs: 30,
            retention_days: Some(30),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, u64); 10] = [
            ("workers", self.workers as u64),
            ("channel_capacity", self.channel_capacity as u64),
            ("feeder_tick_ms", self.feeder_tick_ms),
            ("pop_timeout_ms", self.pop_timeout_ms),
            ("fallback_batch", self.fallback_batch as u64),
            ("lock_ttl_secs", self.lock_ttl_secs),
            ("task_cache_ttl_secs", self.task_cache_ttl_secs),
            ("counter_ttl_secs", self.counter_ttl_secs),
            ("cleaner_interval_secs", self.cleaner_interval_secs),
            ("health_interval_secs", self.health_interval_secs),
        ];
        match checks.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::Zero(*name)),
            None => Ok(()),
        }
    }

    pub fn feeder_tick(&self) -> Duration {
        Duration::from_millis(self.feeder_tick_ms)
    }

    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn task_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.task_cache_ttl_secs)
    }

    pub fn counter_ttl(&self) -> Duration {
        Duration::from_secs(self.counter_ttl_secs)
    }

    pub fn cleaner_interval(&self) -> Duration {
        Duration::from_secs(self.cleaner_interval_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        self.retention_days
            .and_then(|days| i64::try_from(days).ok())
            .map(chrono::Duration::days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 10);
        assert_eq!(config.channel_capacity, 100);
        assert_eq!(config.lock_ttl(), Duration::from_secs(300));
    }

    #[rstest]
    #[case::workers(SchedulerConfig { workers: 0, ..Default::default() }, "workers")]
    #[case::capacity(SchedulerConfig { channel_capacity: 0, ..Default::default() }, "channel_capacity")]
    #[case::tick(SchedulerConfig { feeder_tick_ms: 0, ..Default::default() }, "feeder_tick_ms")]
    #[case::batch(SchedulerConfig { fallback_batch: 0, ..Default::default() }, "fallback_batch")]
    fn zero_values_are_rejected(#[case] config: SchedulerConfig, #[case] field: &'static str) {
        assert_eq!(config.validate(), Err(ConfigError::Zero(field)));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{ "workers": 3, "lock_release": "owner_checked" }"#).unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.lock_release, LockReleaseMode::OwnerChecked);
        assert_eq!(config.fallback_batch, 10);
    }

    #[test]
    fn retention_can_be_disabled() {
        let config: SchedulerConfig = serde_json::from_str(r#"{ "retention_days": null }"#).unwrap();
        assert!(config.retention().is_none());
    }
}
