//! shuttle-core
//!
//! Core building blocks of the shuttle task scheduler.
//!
//! # モジュール構成
//! - **domain**: tasks, status state machine, lanes, outcomes, events, stats
//! - **ports**: TaskStore (durable), EphemeralStore (fast path, locks,
//!   counters, pub/sub), Executor, Clock
//! - **app**: builder, scheduler lifecycle, feeder, workers, locks, loops
//! - **impls**: in-memory stores and the handler-registry executor
//! - **config**: `SchedulerConfig`
//! - **error**: error types

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;

pub use app::{BuildError, HealthReport, SchedulerBuilder, TaskScheduler};
pub use config::{ConfigError, LockReleaseMode, SchedulerConfig};
pub use error::{ExecutorError, SchedulerError, StoreError};
