//! Fast-path delivery over the ephemeral store.
//!
//! Entries are full JSON snapshots of the task. Delivery is at-least-once
//! and unordered across lanes; the durable store stays authoritative.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::{Lane, Task, TaskId};
use crate::error::StoreError;
use crate::ports::EphemeralStore;

/// Cache key of a task's fast-path snapshot.
pub fn cache_key(id: &TaskId) -> String {
    format!("task:{id}")
}

#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn EphemeralStore>,
    high_priority_threshold: i32,
    cache_ttl: Duration,
}

impl TaskQueue {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        high_priority_threshold: i32,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            high_priority_threshold,
            cache_ttl,
        }
    }

    /// Push onto the task's lane and cache the snapshot under `task:<id>`.
    pub async fn enqueue(&self, task: &Task) -> Result<Lane, StoreError> {
        let lane = self.requeue(task).await?;
        let entry = serde_json::to_string(task)?;
        self.store
            .set(&cache_key(&task.id), entry, self.cache_ttl)
            .await?;
        Ok(lane)
    }

    /// Put a task back on its lane without touching the cache.
    pub async fn requeue(&self, task: &Task) -> Result<Lane, StoreError> {
        let lane = task.lane(self.high_priority_threshold);
        let entry = serde_json::to_string(task)?;
        self.store.push(lane.key(), entry).await?;
        debug!(task_id = %task.id, %lane, "task queued on fast path");
        Ok(lane)
    }

    /// Pop one task, high lane first, waiting up to `timeout` on each lane.
    ///
    /// `Ok(None)` means both lanes were empty. An entry that does not decode
    /// is consumed and reported as `StoreError::Serialization`.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<Task>, StoreError> {
        for lane in Lane::ALL {
            if let Some(entry) = self.store.pop_blocking(lane.key(), timeout).await? {
                let task: Task = serde_json::from_str(&entry)?;
                return Ok(Some(task));
            }
        }
        Ok(None)
    }

    pub async fn lengths(&self) -> Result<Vec<(Lane, usize)>, StoreError> {
        let mut lengths = Vec::with_capacity(Lane::ALL.len());
        for lane in Lane::ALL {
            lengths.push((lane, self.store.queue_length(lane.key()).await?));
        }
        Ok(lengths)
    }

    pub async fn evict(&self, id: &TaskId) -> Result<(), StoreError> {
        self.store.delete(&cache_key(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskType;
    use crate::impls::InMemoryEphemeralStore;

    fn queue(store: Arc<InMemoryEphemeralStore>) -> TaskQueue {
        TaskQueue::new(store, 5, Duration::from_secs(3600))
    }

    fn task(id: &str, priority: i32) -> Task {
        Task::new("u", "s", TaskType::new("chat"), "hi")
            .with_id(id)
            .with_priority(priority)
    }

    #[tokio::test]
    async fn enqueue_routes_by_priority_and_caches() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let q = queue(Arc::clone(&store));

        assert_eq!(q.enqueue(&task("a", 1)).await.unwrap(), Lane::Low);
        assert_eq!(q.enqueue(&task("b", 7)).await.unwrap(), Lane::High);

        assert_eq!(q.lengths().await.unwrap(), vec![(Lane::High, 1), (Lane::Low, 1)]);
        assert!(store.get("task:a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dequeue_prefers_high_lane() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let q = queue(store);
        q.enqueue(&task("low", 0)).await.unwrap();
        q.enqueue(&task("high", 9)).await.unwrap();

        let timeout = Duration::from_millis(5);
        assert_eq!(q.dequeue(timeout).await.unwrap().unwrap().id.as_str(), "high");
        assert_eq!(q.dequeue(timeout).await.unwrap().unwrap().id.as_str(), "low");
        assert!(q.dequeue(timeout).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn undecodable_entry_is_consumed_and_reported() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        store.push("queue:high", "{not json".into()).await.unwrap();
        let q = queue(Arc::clone(&store));

        let err = q.dequeue(Duration::from_millis(5)).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
        assert_eq!(store.queue_length("queue:high").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn evict_drops_cache_entry() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let q = queue(Arc::clone(&store));
        let t = task("a", 1);
        q.enqueue(&t).await.unwrap();

        q.evict(&t.id).await.unwrap();
        assert!(store.get("task:a").await.unwrap().is_none());
    }
}
