//! Distributed mutual exclusion on top of the ephemeral store's atomic
//! set-if-absent.
//!
//! The store is the sole arbiter: a lock is held exactly while its key
//! exists. Holders that crash are recovered by the TTL. A holder that runs
//! past the TTL can overlap with the next holder; that window is accepted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{debug, warn};

use crate::config::LockReleaseMode;
use crate::domain::TaskId;
use crate::error::StoreError;
use crate::ports::{Clock, EphemeralStore};

const TOKEN_LEN: usize = 24;

/// Latest `updated_at` a running task can have and still be abandoned: any
/// lock taken before it has expired by `now`.
pub(crate) fn stale_cutoff(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl).ok()?;
    now.checked_sub_signed(ttl)
}

/// A held lock. Pass it back to `LockManager::release`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    key: String,
    token: String,
    acquired_at: DateTime<Utc>,
    ttl: Duration,
}

impl Lock {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Random value stored under the key; identifies this holder.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn EphemeralStore>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    release_mode: LockReleaseMode,
}

impl LockManager {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        clock: Arc<dyn Clock>,
        default_ttl: Duration,
        release_mode: LockReleaseMode,
    ) -> Self {
        Self {
            store,
            clock,
            default_ttl,
            release_mode,
        }
    }

    /// `lock:task:<id>`
    pub fn task_key(id: &TaskId) -> String {
        format!("lock:task:{id}")
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub async fn acquire(&self, key: &str) -> Result<Option<Lock>, StoreError> {
        self.acquire_with_ttl(key, self.default_ttl).await
    }

    /// `Some` only if this call created the entry.
    pub async fn acquire_with_ttl(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<Lock>, StoreError> {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();

        if !self.store.set_if_absent(key, token.clone(), ttl).await? {
            debug!(key, "lock held elsewhere");
            return Ok(None);
        }

        Ok(Some(Lock {
            key: key.to_string(),
            token,
            acquired_at: self.clock.now(),
            ttl,
        }))
    }

    /// Release per the configured mode.
    ///
    /// `Unconditional` deletes the key even if it has expired and been taken
    /// by someone else. `OwnerChecked` leaves a foreign holder's key alone.
    pub async fn release(&self, lock: &Lock) -> Result<(), StoreError> {
        match self.release_mode {
            LockReleaseMode::Unconditional => self.store.delete(&lock.key).await,
            LockReleaseMode::OwnerChecked => {
                if !self.store.delete_if_equals(&lock.key, &lock.token).await? {
                    warn!(key = %lock.key, "lock expired before release; left to current holder");
                }
                Ok(())
            }
        }
    }
}
