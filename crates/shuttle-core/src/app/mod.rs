//! App - アプリケーション層
//!
//! Combines the ports into the scheduler.
//!
//! # 主要コンポーネント
//! - **SchedulerBuilder**: wiring and fail-fast validation
//! - **TaskScheduler**: submission, start/stop, stats, health
//! - **Feeder**: fast path / fallback into the dispatch channel
//! - **Worker**: lock → execute → finalize → unlock
//! - **LockManager**: distributed lock over the ephemeral store
//! - **Cleaner**, **HealthChecker**: periodic loops

pub mod builder;
pub mod cleaner_loop;
pub mod delivery;
pub mod feeder;
pub mod health_loop;
pub mod lock;
pub mod scheduler;
pub mod stats;
pub mod worker_loop;

#[cfg(test)]
pub(crate) mod testing;

pub use self::builder::{BuildError, SchedulerBuilder};
pub use self::cleaner_loop::{CleanReport, Cleaner};
pub use self::delivery::TaskQueue;
pub use self::feeder::{FeedReport, Feeder};
pub use self::health_loop::{ComponentHealth, HealthChecker, HealthProbe, HealthReport};
pub use self::lock::{Lock, LockManager};
pub use self::scheduler::TaskScheduler;
pub use self::stats::{Outcome, StatsRecorder};
pub use self::worker_loop::{ProcessOutcome, Worker, WorkerContext};
