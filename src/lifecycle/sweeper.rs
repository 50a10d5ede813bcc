use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::PlanLifecycle;
use crate::clock::Clock;

/// Task status tracking
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TaskStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub expired_total: u64,
    pub dispatched_total: u64,
    pub completed_total: u64,
}

/// Periodically expires undecided plans, resumes unrecorded dispatches and
/// completes finished plans.
pub struct LifecycleSweeper {
    lifecycle: Arc<PlanLifecycle>,
    clock: Arc<dyn Clock>,
    period: Duration,
    status: Arc<RwLock<TaskStatus>>,
}

impl LifecycleSweeper {
    pub fn new(lifecycle: Arc<PlanLifecycle>, clock: Arc<dyn Clock>, interval_secs: u64) -> Self {
        Self {
            lifecycle,
            clock,
            period: Duration::from_secs(interval_secs.max(1)),
            status: Arc::new(RwLock::new(TaskStatus::default())),
        }
    }

    pub fn status_handle(&self) -> Arc<RwLock<TaskStatus>> {
        self.status.clone()
    }

    pub async fn status(&self) -> TaskStatus {
        self.status.read().await.clone()
    }

    /// One sweep pass with status bookkeeping.
    pub async fn run_once(&self) {
        let now = self.clock.now();
        let report = self.lifecycle.sweep(now).await;

        let mut status = self.status.write().await;
        status.last_run = Some(now);
        status.run_count += 1;
        status.expired_total += report.expired as u64;
        status.dispatched_total += report.dispatched as u64;
        status.completed_total += report.completed as u64;

        if report.failed > 0 {
            warn!(failed = report.failed, "lifecycle sweep left plans behind");
            status.last_error = Some(format!("{} plan(s) failed to transition", report.failed));
            status.error_count += 1;
        } else {
            status.last_success = Some(now);
            status.success_count += 1;
        }

        if report.changed() > 0 {
            info!(
                expired = report.expired,
                dispatched = report.dispatched,
                completed = report.completed,
                "lifecycle sweep"
            );
        } else {
            debug!("lifecycle sweep: nothing to do");
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.period.as_secs(), "lifecycle sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("lifecycle sweeper stopped");
                    break;
                }
                _ = ticker.tick() => self.run_once().await,
            }
        }
    }
}
