//! In-memory TaskStore (development / tests).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{ConversationMemory, Task, TaskId, TaskStatus};
use crate::error::StoreError;
use crate::ports::TaskStore;

#[derive(Default)]
struct InMemoryTaskStoreState {
    tasks: HashMap<TaskId, Task>,
    memories: HashMap<String, ConversationMemory>,
    /// Every status a task has been in, in order. Lets tests check that the
    /// observed sequence is a legal prefix.
    history: HashMap<TaskId, Vec<TaskStatus>>,
}

impl InMemoryTaskStoreState {
    /// Apply `next` if it is a legal step, running `apply` on the record too.
    fn transition(
        &mut self,
        id: &TaskId,
        next: TaskStatus,
        at: DateTime<Utc>,
        apply: impl FnOnce(&mut Task),
    ) -> bool {
        let Some(task) = self.tasks.get_mut(id) else {
            return false;
        };
        if !task.status.can_transition_to(next) {
            return false;
        }

        task.status = next;
        task.updated_at = at;
        if next.is_terminal() {
            task.completed_at = Some(at);
        }
        apply(task);

        self.history.entry(id.clone()).or_default().push(next);
        true
    }
}

/// TaskStore backed by a `HashMap`.
///
/// `set_available(false)` makes every call fail with
/// `StoreError::Unavailable`, for exercising outage paths.
pub struct InMemoryTaskStore {
    state: Mutex<InMemoryTaskStoreState>,
    available: AtomicBool,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryTaskStoreState::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn status_history(&self, id: &TaskId) -> Vec<TaskStatus> {
        let state = self.state.lock().await;
        state.history.get(id).cloned().unwrap_or_default()
    }

    pub async fn conversation_memory(&self, session_id: &str) -> Option<ConversationMemory> {
        let state = self.state.lock().await;
        state.memories.get(session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("task store offline".into()))
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        if state.tasks.contains_key(&task.id) {
            return Err(StoreError::Conflict(task.id.clone()));
        }
        state.tasks.insert(task.id.clone(), task.clone());
        state.history.insert(task.id.clone(), vec![task.status]);
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state.tasks.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        Ok(state.transition(id, status, at, |_| {}))
    }

    async fn complete_task(
        &self,
        id: &TaskId,
        output: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        Ok(state.transition(id, TaskStatus::Completed, at, |task| {
            task.output = Some(output.to_string());
        }))
    }

    async fn fail_task(
        &self,
        id: &TaskId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        Ok(state.transition(id, TaskStatus::Failed, at, |task| {
            task.error = Some(error.to_string());
        }))
    }

    async fn get_pending_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        let mut pending: Vec<Task> = state
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn get_stale_running_tasks(
        &self,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        let mut stale: Vec<Task> = state
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Running && task.updated_at < updated_before)
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));
        stale.truncate(limit);
        Ok(stale)
    }

    async fn save_conversation_memory(&self, memory: &ConversationMemory) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        state
            .memories
            .insert(memory.session_id.clone(), memory.clone());
        Ok(())
    }

    async fn prune_terminal_tasks(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let stale: Vec<TaskId> = state
            .tasks
            .values()
            .filter(|task| {
                task.status.is_terminal() && task.completed_at.is_some_and(|at| at < before)
            })
            .map(|task| task.id.clone())
            .collect();
        for id in &stale {
            state.tasks.remove(id);
            state.history.remove(id);
        }
        Ok(stale.len() as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_available()
    }
}
