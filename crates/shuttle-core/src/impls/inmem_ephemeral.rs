//! In-memory EphemeralStore (development / tests).
//!
//! Expiry is measured with `tokio::time::Instant`, so tests running with a
//! paused clock can step over TTLs with `tokio::time::advance`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::time::Instant;

use crate::error::StoreError;
use crate::ports::EphemeralStore;

const CHANNEL_CAPACITY: usize = 256;

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at > Instant::now()
    }
}

#[derive(Default)]
struct InMemoryEphemeralState {
    queues: HashMap<String, VecDeque<String>>,
    values: HashMap<String, Expiring<String>>,
    counters: HashMap<String, Expiring<i64>>,
    channels: HashMap<String, broadcast::Sender<String>>,
}

impl InMemoryEphemeralState {
    /// Look up a key, dropping it first if it has expired.
    fn live_value(&mut self, key: &str) -> Option<&mut Expiring<String>> {
        if self.values.get(key).is_some_and(|entry| !entry.is_live()) {
            self.values.remove(key);
        }
        self.values.get_mut(key)
    }

    fn live_counter(&mut self, key: &str) -> Option<&mut Expiring<i64>> {
        if self.counters.get(key).is_some_and(|entry| !entry.is_live()) {
            self.counters.remove(key);
        }
        self.counters.get_mut(key)
    }
}

pub struct InMemoryEphemeralStore {
    state: Mutex<InMemoryEphemeralState>,
    /// Woken on every push so blocked pops can re-check.
    notify: Notify,
    available: AtomicBool,
}

impl InMemoryEphemeralStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryEphemeralState::default()),
            notify: Notify::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while `false`, every call fails with
    /// `StoreError::Unavailable`. Data is kept.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        // 待機中の pop に状態変化を知らせる
        self.notify.notify_waiters();
    }

    /// Receive every message published on `channel` from now on.
    pub async fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        let mut state = self.state.lock().await;
        state
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("ephemeral store offline".into()))
        }
    }
}

impl Default for InMemoryEphemeralStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EphemeralStore for InMemoryEphemeralStore {
    async fn push(&self, queue: &str, entry: String) -> Result<(), StoreError> {
        self.ensure_available()?;
        {
            let mut state = self.state.lock().await;
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(entry);
        }
        // Notify outside the lock
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop_blocking(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking, so a push between the check
            // and the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.ensure_available()?;
            {
                let mut state = self.state.lock().await;
                if let Some(entry) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) {
                    return Ok(Some(entry));
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn queue_length(&self, queue: &str) -> Result<usize, StoreError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state.queues.get(queue).map_or(0, VecDeque::len))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        state
            .values
            .insert(key.to_string(), Expiring::new(value, ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        Ok(state.live_value(key).map(|entry| entry.value.clone()))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        if state.live_value(key).is_some() {
            return Ok(false);
        }
        state
            .values
            .insert(key.to_string(), Expiring::new(value, ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        state.values.remove(key);
        state.counters.remove(key);
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let matches = state
            .live_value(key)
            .is_some_and(|entry| entry.value == value);
        if matches {
            state.values.remove(key);
        }
        Ok(matches)
    }

    async fn increment_counter(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let next = state.live_counter(key).map_or(0, |entry| entry.value) + 1;
        state
            .counters
            .insert(key.to_string(), Expiring::new(next, ttl));
        Ok(next)
    }

    async fn get_counter(&self, key: &str) -> Result<i64, StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        Ok(state.live_counter(key).map_or(0, |entry| entry.value))
    }

    async fn publish(&self, channel: &str, message: String) -> Result<(), StoreError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        if let Some(tx) = state.channels.get(channel) {
            // no subscribers is fine
            let _ = tx.send(message);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_available()
    }
}
