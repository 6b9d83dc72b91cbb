//! EphemeralStore port - fast, lossy, shared between processes.
//!
//! Offers four capabilities the scheduler builds on:
//! - FIFO lists (the high/low fast-path lanes)
//! - keys with expiry (task cache, distributed locks)
//! - atomic counters (daily stats)
//! - publish/subscribe (task events)
//!
//! Nothing here is authoritative. Callers treat every failure as
//! "degraded", never as "task lost".

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Append an entry to the tail of `queue`.
    async fn push(&self, queue: &str, entry: String) -> Result<(), StoreError>;

    /// Take the head of `queue`, waiting at most `timeout` for one to appear.
    async fn pop_blocking(&self, queue: &str, timeout: Duration)
    -> Result<Option<String>, StoreError>;

    async fn queue_length(&self, queue: &str) -> Result<usize, StoreError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Atomic create. `true` only if this call created the key.
    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration)
    -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomic compare-and-delete. `true` if the key held `value` and is gone.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// Increment and (re)arm the key's expiry. Returns the new value.
    async fn increment_counter(&self, key: &str, ttl: Duration) -> Result<i64, StoreError>;

    /// Missing counters read as zero.
    async fn get_counter(&self, key: &str) -> Result<i64, StoreError>;

    async fn publish(&self, channel: &str, message: String) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
