//! Ports - the seams to external collaborators.
//!
//! - `TaskStore`: durable source of truth
//! - `EphemeralStore`: fast-path queues, locks, counters, pub/sub
//! - `Executor`: runs a task
//! - `Clock`: wall-clock time

pub mod clock;
pub mod ephemeral;
pub mod executor;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::ephemeral::EphemeralStore;
pub use self::executor::Executor;
pub use self::task_store::TaskStore;
