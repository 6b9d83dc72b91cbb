//! Adapters that live in this crate.
//!
//! - `InMemoryTaskStore`, `InMemoryEphemeralStore`: development and tests
//! - `RegistryExecutor`: in-process handlers keyed by task type

pub mod inmem_ephemeral;
pub mod inmem_task_store;
pub mod registry_executor;

pub use self::inmem_ephemeral::InMemoryEphemeralStore;
pub use self::inmem_task_store::InMemoryTaskStore;
pub use self::registry_executor::{HandlerRegistry, RegistryError, RegistryExecutor, TaskHandler};
