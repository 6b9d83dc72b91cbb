//! Health checker - periodic liveness of stores and workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::ports::{Clock, EphemeralStore, TaskStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Not checked yet.
    Unknown,
    Healthy,
    Unreachable(String),
}

impl ComponentHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ComponentHealth::Healthy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub checked_at: Option<DateTime<Utc>>,
    pub durable: ComponentHealth,
    pub ephemeral: ComponentHealth,
    pub live_workers: usize,
    pub expected_workers: usize,
}

impl HealthReport {
    pub fn unknown() -> Self {
        Self {
            checked_at: None,
            durable: ComponentHealth::Unknown,
            ephemeral: ComponentHealth::Unknown,
            live_workers: 0,
            expected_workers: 0,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.durable.is_healthy()
            && self.ephemeral.is_healthy()
            && self.live_workers == self.expected_workers
    }
}

#[derive(Clone)]
pub struct HealthProbe {
    durable: Arc<dyn TaskStore>,
    ephemeral: Arc<dyn EphemeralStore>,
    clock: Arc<dyn Clock>,
    live_workers: Arc<AtomicUsize>,
    expected_workers: usize,
}

impl HealthProbe {
    pub fn new(
        durable: Arc<dyn TaskStore>,
        ephemeral: Arc<dyn EphemeralStore>,
        clock: Arc<dyn Clock>,
        live_workers: Arc<AtomicUsize>,
        expected_workers: usize,
    ) -> Self {
        Self {
            durable,
            ephemeral,
            clock,
            live_workers,
            expected_workers,
        }
    }

    pub async fn check(&self) -> HealthReport {
        let durable = match self.durable.ping().await {
            Ok(()) => ComponentHealth::Healthy,
            Err(err) => ComponentHealth::Unreachable(err.to_string()),
        };
        let ephemeral = match self.ephemeral.ping().await {
            Ok(()) => ComponentHealth::Healthy,
            Err(err) => ComponentHealth::Unreachable(err.to_string()),
        };
        HealthReport {
            checked_at: Some(self.clock.now()),
            durable,
            ephemeral,
            live_workers: self.live_workers.load(Ordering::SeqCst),
            expected_workers: self.expected_workers,
        }
    }
}

pub struct HealthChecker {
    probe: HealthProbe,
    interval: Duration,
    report_tx: Arc<watch::Sender<HealthReport>>,
}

impl HealthChecker {
    pub fn new(
        probe: HealthProbe,
        interval: Duration,
        report_tx: Arc<watch::Sender<HealthReport>>,
    ) -> Self {
        Self {
            probe,
            interval,
            report_tx,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {}
            }
            let report = tokio::select! {
                _ = shutdown_rx.changed() => break,
                report = self.probe.check() => report,
            };
            if report.is_healthy() {
                debug!(live_workers = report.live_workers, "health check ok");
            } else {
                warn!(?report, "scheduler degraded");
            }
            self.report_tx.send_replace(report);
        }
    }
}
