//! Daily counters and task events.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::warn;

use crate::domain::{Counter, TASK_EVENTS_CHANNEL, TaskEvent, TaskStats};
use crate::error::StoreError;
use crate::ports::{Clock, EphemeralStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Clone)]
pub struct StatsRecorder {
    store: Arc<dyn EphemeralStore>,
    clock: Arc<dyn Clock>,
    counter_ttl: Duration,
}

impl StatsRecorder {
    pub fn new(store: Arc<dyn EphemeralStore>, clock: Arc<dyn Clock>, counter_ttl: Duration) -> Self {
        Self {
            store,
            clock,
            counter_ttl,
        }
    }

    /// Bump today's total and the matching outcome counter. Best-effort.
    pub async fn record(&self, outcome: Outcome) {
        let today = self.clock.today();
        let counter = match outcome {
            Outcome::Success => Counter::Success,
            Outcome::Failure => Counter::Failure,
        };
        for counter in [Counter::Total, counter] {
            let key = counter.key(today);
            if let Err(err) = self.store.increment_counter(&key, self.counter_ttl).await {
                warn!(%key, error = %err, "failed to increment counter");
            }
        }
    }

    /// Publish on the task events channel. Best-effort.
    pub async fn publish(&self, event: &TaskEvent) {
        let message = match serde_json::to_string(event) {
            Ok(message) => message,
            Err(err) => {
                warn!(task_id = %event.task_id, error = %err, "failed to encode task event");
                return;
            }
        };
        if let Err(err) = self.store.publish(TASK_EVENTS_CHANNEL, message).await {
            warn!(task_id = %event.task_id, error = %err, "failed to publish task event");
        }
    }

    /// Counts for one UTC day; missing counters read as zero.
    pub async fn task_stats(&self, date: NaiveDate) -> Result<TaskStats, StoreError> {
        Ok(TaskStats {
            total: self.store.get_counter(&Counter::Total.key(date)).await?,
            success: self.store.get_counter(&Counter::Success.key(date)).await?,
            failure: self.store.get_counter(&Counter::Failure.key(date)).await?,
        })
    }
}
