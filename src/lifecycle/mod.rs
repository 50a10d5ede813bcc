//! Plan identity, guarded state transitions and dispatch hand-off.
//!
//! Each plan sits behind its own async mutex. Approvals additionally take a
//! global commit gate so the overlap check and the commit happen atomically
//! with respect to other approvals. Lock order is always gate, own plan, then
//! other plans; every other path holds at most one plan lock at a time.

pub mod history;
pub mod state;
pub mod store;
pub mod sweeper;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::LifecycleConfig;
use crate::dispatch::{deliver, RetryPolicy, SignalDispatcher, SignalRequest};
use crate::domain::{
    AuditEntry, DRPlan, PlanFilter, PlanState, PlanningError, Signal, SignalFilter, SignalStatus,
};

pub use history::{HistorySummary, PerformanceRecord};
pub use state::Transition;
pub use store::{InMemoryPlanStore, JsonlPlanStore, PlanStore, StoredState};
pub use sweeper::LifecycleSweeper;

const SYSTEM_ACTOR: &str = "system";
const PLANNER_ACTOR: &str = "planner";

const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";
const WINDOW_ENDED_BEFORE_DISPATCH: &str = "window ended before dispatch";

type PlanHandle = Arc<Mutex<DRPlan>>;

/// Counts from one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    /// Approved plans whose dispatch hand-off had not been recorded.
    pub dispatched: usize,
    pub completed: usize,
    /// Plans that could not be advanced; they are retried on the next pass.
    pub failed: usize,
}

impl SweepReport {
    pub fn changed(&self) -> usize {
        self.expired + self.dispatched + self.completed
    }
}

pub struct PlanLifecycle {
    plans: RwLock<HashMap<Uuid, PlanHandle>>,
    audit: parking_lot::Mutex<HashMap<Uuid, Vec<AuditEntry>>>,
    performance: parking_lot::Mutex<Vec<PerformanceRecord>>,
    commit_gate: Mutex<()>,
    store: Arc<dyn PlanStore>,
    dispatcher: Arc<dyn SignalDispatcher>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    cfg: LifecycleConfig,
    dispatches: parking_lot::Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl PlanLifecycle {
    /// Build a lifecycle over `store`, replaying whatever it already holds.
    ///
    /// Signals still pending in a restored plan were cut off mid-delivery.
    /// They are not sent again; they are marked failed so plan status shows
    /// that delivery is unknown.
    pub async fn open(
        store: Arc<dyn PlanStore>,
        dispatcher: Arc<dyn SignalDispatcher>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
        cfg: LifecycleConfig,
    ) -> Result<Self, PlanningError> {
        let StoredState {
            plans,
            audit,
            performance,
        } = store.load_all().await?;

        let mut audit_by_plan: HashMap<Uuid, Vec<AuditEntry>> = HashMap::new();
        for entry in audit {
            audit_by_plan.entry(entry.plan_id).or_default().push(entry);
        }

        let now = clock.now();
        let restored = plans.len();
        let mut interrupted = 0;
        let mut by_id = HashMap::with_capacity(restored);
        for mut plan in plans {
            if Self::fail_pending_signals(&mut plan, INTERRUPTED_BY_RESTART, now) > 0 {
                store.append_plan(&plan).await?;
                interrupted += 1;
            }
            by_id.insert(plan.id, Arc::new(Mutex::new(plan)));
        }

        if restored > 0 {
            info!(plans = restored, history = performance.len(), "restored plans from store");
        }
        if interrupted > 0 {
            warn!(plans = interrupted, "pending signals from before restart marked failed");
        }

        Ok(Self {
            plans: RwLock::new(by_id),
            audit: parking_lot::Mutex::new(audit_by_plan),
            performance: parking_lot::Mutex::new(performance),
            commit_gate: Mutex::new(()),
            store,
            dispatcher,
            retry,
            clock,
            cfg,
            dispatches: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::seconds(self.cfg.freshness_window_secs)
    }

    /// Register a freshly built plan. It must be in `Proposed`.
    pub async fn insert_proposed(&self, plan: DRPlan) -> Result<DRPlan, PlanningError> {
        if plan.state != PlanState::Proposed {
            return Err(PlanningError::InvalidState {
                plan_id: plan.id,
                state: plan.state,
                expected: PlanState::Proposed,
            });
        }

        self.store.append_plan(&plan).await?;
        let entry = AuditEntry {
            plan_id: plan.id,
            from: None,
            to: PlanState::Proposed,
            actor: PLANNER_ACTOR.to_string(),
            at: plan.created_at,
            note: None,
        };
        self.record_audit(entry).await?;

        self.plans
            .write()
            .await
            .insert(plan.id, Arc::new(Mutex::new(plan.clone())));
        info!(plan_id = %plan.id, strategy = %plan.strategy, target_mw = plan.target_mw_total, "plan proposed");
        Ok(plan)
    }

    /// Approve a proposed plan and hand it straight to dispatch.
    ///
    /// The returned plan is already `Dispatched`; signal delivery continues in
    /// the background and is visible through [`plan_status`](Self::plan_status).
    /// If the approval is recorded but the hand-off is not, the error is
    /// returned and the sweeper finishes the hand-off.
    pub async fn approve_plan(
        &self,
        id: Uuid,
        operator_id: &str,
        notes: Option<String>,
    ) -> Result<DRPlan, PlanningError> {
        let _gate = self.commit_gate.lock().await;
        let handle = self.handle(id).await?;
        let mut plan = handle.lock().await;

        Self::check_transition(&plan, Transition::Approve)?;
        let now = self.clock.now();
        self.expire_if_started(&mut plan, now).await?;

        if let Some(conflicting_id) = self.find_overlap(&plan).await {
            warn!(plan_id = %id, %conflicting_id, "approval blocked by overlapping plan");
            return Err(PlanningError::OverlapConflict {
                plan_id: id,
                conflicting_id,
            });
        }

        let age = now - plan.situation_summary.snapshot_at;
        if age > self.freshness_window() {
            warn!(plan_id = %id, age_secs = age.num_seconds(), "approval blocked by stale snapshot");
            return Err(PlanningError::StaleData {
                plan_id: id,
                age_secs: age.num_seconds(),
                limit_secs: self.cfg.freshness_window_secs,
            });
        }

        let mut approved = plan.clone();
        approved.state = Transition::Approve.target();
        approved.decided_at = Some(now);
        approved.decided_by = Some(operator_id.to_string());
        approved.operator_notes = notes.clone();
        self.commit(&mut plan, approved, operator_id, notes).await?;
        info!(plan_id = %id, operator_id, "plan approved");

        let requests = self.begin_dispatch(&mut plan, now).await?;
        let result = plan.clone();
        drop(plan);

        self.spawn_dispatch(id, handle, requests);
        Ok(result)
    }

    pub async fn reject_plan(
        &self,
        id: Uuid,
        operator_id: &str,
        reason: &str,
    ) -> Result<DRPlan, PlanningError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PlanningError::InvalidRequest(
                "rejection reason must not be empty".to_string(),
            ));
        }

        let handle = self.handle(id).await?;
        let mut plan = handle.lock().await;
        Self::check_transition(&plan, Transition::Reject)?;
        let now = self.clock.now();
        self.expire_if_started(&mut plan, now).await?;

        let mut rejected = plan.clone();
        rejected.state = Transition::Reject.target();
        rejected.decided_at = Some(now);
        rejected.decided_by = Some(operator_id.to_string());
        rejected.rejection_reason = Some(reason.to_string());
        self.commit(&mut plan, rejected, operator_id, Some(reason.to_string()))
            .await?;

        info!(plan_id = %id, operator_id, reason, "plan rejected");
        Ok(plan.clone())
    }

    pub async fn plan_status(&self, id: Uuid) -> Result<DRPlan, PlanningError> {
        let handle = self.handle(id).await?;
        let plan = handle.lock().await;
        Ok(plan.clone())
    }

    /// Matching plans, newest first.
    pub async fn list_plans(&self, filter: &PlanFilter) -> Vec<DRPlan> {
        let mut out = Vec::new();
        for handle in self.handles().await {
            let plan = handle.lock().await;
            if filter.matches(&plan) {
                out.push(plan.clone());
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        out
    }

    /// Matching signals across all plans, most recently updated first.
    pub async fn list_signals(&self, filter: &SignalFilter) -> Vec<Signal> {
        let mut out = Vec::new();
        for handle in self.handles().await {
            let plan = handle.lock().await;
            out.extend(plan.signals.iter().filter(|s| filter.matches(s)).cloned());
        }
        out.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.plan_id.cmp(&b.plan_id))
                .then_with(|| a.cohort_id.cmp(&b.cohort_id))
        });
        out
    }

    pub async fn audit_log(&self, id: Uuid) -> Result<Vec<AuditEntry>, PlanningError> {
        self.handle(id).await?;
        Ok(self.audit.lock().get(&id).cloned().unwrap_or_default())
    }

    /// Performance records of completed plans, most recent first.
    pub fn performance_history(&self, limit: usize) -> Vec<PerformanceRecord> {
        let mut records = self.performance.lock().clone();
        records.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then(a.plan_id.cmp(&b.plan_id))
        });
        records.truncate(limit);
        records
    }

    pub fn history_summary(&self, days: u32) -> HistorySummary {
        HistorySummary::over(&self.performance.lock(), self.clock.now(), days)
    }

    /// Expire undecided plans whose window has started, finish dispatch
    /// hand-offs that were not recorded, and complete dispatched plans whose
    /// window has ended. Safe to call repeatedly. A plan that cannot be
    /// advanced is logged and counted; the rest of the pass continues.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        for handle in self.handles().await {
            let mut plan = handle.lock().await;
            if let Err(e) = self.sweep_plan(&mut plan, &handle, now, &mut report).await {
                error!(plan_id = %plan.id, state = %plan.state, error = %e, "sweep could not advance plan");
                report.failed += 1;
            }
        }
        report
    }

    /// Dispatched or completed events per cohort whose window started in the
    /// seven days before `now` or later.
    pub async fn event_counts(&self, now: DateTime<Utc>) -> HashMap<String, u32> {
        let since = now - Duration::days(7);
        let mut counts = HashMap::new();
        for handle in self.handles().await {
            let plan = handle.lock().await;
            if !matches!(plan.state, PlanState::Dispatched | PlanState::Completed)
                || plan.window_start < since
            {
                continue;
            }
            for allocation in plan.cohort_allocations.iter().filter(|a| a.target_mw > 0.0) {
                *counts.entry(allocation.cohort_id.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Wait for the background dispatch of `id` to finish, if one is running.
    pub async fn settle_dispatch(&self, id: Uuid) {
        let handle = self.dispatches.lock().remove(&id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(plan_id = %id, error = %e, "dispatch task failed");
            }
        }
    }

    /// Wait for every in-flight dispatch. Used on shutdown.
    pub async fn settle_all(&self) {
        let handles: Vec<(Uuid, JoinHandle<()>)> = self.dispatches.lock().drain().collect();
        for (id, handle) in handles {
            if let Err(e) = handle.await {
                error!(plan_id = %id, error = %e, "dispatch task failed");
            }
        }
    }

    async fn handle(&self, id: Uuid) -> Result<PlanHandle, PlanningError> {
        self.plans
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(PlanningError::NotFound(id))
    }

    async fn handles(&self) -> Vec<PlanHandle> {
        self.plans.read().await.values().cloned().collect()
    }

    fn check_transition(plan: &DRPlan, transition: Transition) -> Result<(), PlanningError> {
        transition
            .apply(plan.state)
            .map(|_| ())
            .ok_or(PlanningError::InvalidState {
                plan_id: plan.id,
                state: plan.state,
                expected: transition.source(),
            })
    }

    /// Move `plan` along a system-driven edge.
    async fn advance(
        &self,
        plan: &mut DRPlan,
        transition: Transition,
    ) -> Result<(), PlanningError> {
        Self::check_transition(plan, transition)?;
        let mut next = plan.clone();
        next.state = transition.target();
        self.commit(plan, next, SYSTEM_ACTOR, None).await
    }

    /// A proposed plan whose window has started can no longer be decided on:
    /// expire it and refuse the operator's action.
    async fn expire_if_started(
        &self,
        plan: &mut DRPlan,
        now: DateTime<Utc>,
    ) -> Result<(), PlanningError> {
        if now < plan.window_start {
            return Ok(());
        }
        self.advance(plan, Transition::Expire).await?;
        info!(plan_id = %plan.id, "plan expired before a decision was recorded");
        Err(PlanningError::InvalidState {
            plan_id: plan.id,
            state: plan.state,
            expected: Transition::Expire.source(),
        })
    }

    /// Record Approved -> Dispatched with one signal per non-zero allocation.
    /// Returns the requests still worth sending; none once the window is over.
    async fn begin_dispatch(
        &self,
        plan: &mut DRPlan,
        now: DateTime<Utc>,
    ) -> Result<Vec<SignalRequest>, PlanningError> {
        Self::check_transition(plan, Transition::Dispatch)?;

        let mut dispatched = plan.clone();
        dispatched.state = Transition::Dispatch.target();
        dispatched.signals = dispatched
            .cohort_allocations
            .iter()
            .filter(|a| a.target_mw > 0.0)
            .map(|a| Signal {
                plan_id: dispatched.id,
                cohort_id: a.cohort_id.clone(),
                status: SignalStatus::Pending,
                attempt_count: 0,
                last_error: None,
                updated_at: now,
            })
            .collect();
        let deliverable = now < dispatched.window_end;
        if !deliverable {
            Self::fail_pending_signals(&mut dispatched, WINDOW_ENDED_BEFORE_DISPATCH, now);
        }

        self.commit(plan, dispatched, SYSTEM_ACTOR, None).await?;
        info!(plan_id = %plan.id, signals = plan.signals.len(), deliverable, "plan dispatched");

        Ok(if deliverable {
            Self::signal_requests(plan)
        } else {
            Vec::new()
        })
    }

    async fn sweep_plan(
        &self,
        plan: &mut DRPlan,
        handle: &PlanHandle,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<(), PlanningError> {
        if plan.state == PlanState::Proposed && now >= plan.window_start {
            self.advance(plan, Transition::Expire).await?;
            info!(plan_id = %plan.id, "plan expired without decision");
            report.expired += 1;
        }

        if plan.state == PlanState::Approved {
            let requests = self.begin_dispatch(plan, now).await?;
            warn!(plan_id = %plan.id, signals = requests.len(), "resumed dispatch of approved plan");
            report.dispatched += 1;
            self.spawn_dispatch(plan.id, handle.clone(), requests);
        }

        if plan.state == PlanState::Dispatched && now >= plan.window_end {
            self.advance(plan, Transition::Complete).await?;
            info!(plan_id = %plan.id, failed_signals = plan.failed_signals(), "plan completed");
            report.completed += 1;
            self.record_performance(PerformanceRecord::from_plan(plan, now))
                .await?;
        }
        Ok(())
    }

    /// Earliest-created other plan that holds a claim on an overlapping window.
    /// Caller holds the commit gate and the lock on `plan`.
    async fn find_overlap(&self, plan: &DRPlan) -> Option<Uuid> {
        let mut conflict: Option<(DateTime<Utc>, Uuid)> = None;
        let others: Vec<(Uuid, PlanHandle)> = self
            .plans
            .read()
            .await
            .iter()
            .filter(|(id, _)| **id != plan.id)
            .map(|(id, h)| (*id, h.clone()))
            .collect();

        for (other_id, handle) in others {
            let other = handle.lock().await;
            if other.state.is_active() && other.overlaps_plan(plan) {
                let candidate = (other.created_at, other_id);
                if conflict.map_or(true, |c| candidate < c) {
                    conflict = Some(candidate);
                }
            }
        }
        conflict.map(|(_, id)| id)
    }

    /// Persist `next` and its audit entry, then replace the in-memory plan.
    /// On storage failure the in-memory plan is left untouched.
    async fn commit(
        &self,
        current: &mut DRPlan,
        next: DRPlan,
        actor: &str,
        note: Option<String>,
    ) -> Result<(), PlanningError> {
        self.store.append_plan(&next).await?;
        let entry = AuditEntry {
            plan_id: next.id,
            from: Some(current.state),
            to: next.state,
            actor: actor.to_string(),
            at: self.clock.now(),
            note,
        };
        self.record_audit(entry).await?;
        *current = next;
        Ok(())
    }

    async fn record_audit(&self, entry: AuditEntry) -> Result<(), PlanningError> {
        self.store.append_audit(&entry).await?;
        self.audit.lock().entry(entry.plan_id).or_default().push(entry);
        Ok(())
    }

    async fn record_performance(&self, record: PerformanceRecord) -> Result<(), PlanningError> {
        self.store.append_performance(&record).await?;
        self.performance.lock().push(record);
        Ok(())
    }

    /// Mark every pending signal failed with `reason`. Returns how many changed.
    fn fail_pending_signals(plan: &mut DRPlan, reason: &str, now: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for signal in plan
            .signals
            .iter_mut()
            .filter(|s| s.status == SignalStatus::Pending)
        {
            signal.status = SignalStatus::Failed;
            signal.last_error = Some(reason.to_string());
            signal.updated_at = now;
            changed += 1;
        }
        changed
    }

    fn signal_requests(plan: &DRPlan) -> Vec<SignalRequest> {
        plan.cohort_allocations
            .iter()
            .filter(|a| a.target_mw > 0.0)
            .map(|a| SignalRequest {
                plan_id: plan.id,
                cohort_id: a.cohort_id.clone(),
                target_mw: a.target_mw,
                window_start: plan.window_start,
                window_end: plan.window_end,
                message: a.message_template.clone(),
            })
            .collect()
    }

    fn spawn_dispatch(&self, id: Uuid, plan: PlanHandle, requests: Vec<SignalRequest>) {
        if requests.is_empty() {
            return;
        }
        let dispatcher = self.dispatcher.clone();
        let store = self.store.clone();
        let clock = self.clock.clone();
        let policy = self.retry;

        let task = tokio::spawn(async move {
            let sends = requests.iter().map(|request| {
                let dispatcher = dispatcher.clone();
                let store = store.clone();
                let clock = clock.clone();
                let plan = plan.clone();
                async move {
                    let outcome = deliver(dispatcher.as_ref(), request, &policy).await;
                    let mut plan = plan.lock().await;
                    if let Some(signal) = plan
                        .signals
                        .iter_mut()
                        .find(|s| s.cohort_id == request.cohort_id)
                    {
                        signal.attempt_count = outcome.attempts;
                        signal.updated_at = clock.now();
                        match &outcome.result {
                            Ok(_) => {
                                signal.status = SignalStatus::Acked;
                                signal.last_error = None;
                            }
                            Err(e) => {
                                error!(plan_id = %request.plan_id, cohort_id = %request.cohort_id, attempts = outcome.attempts, error = %e, "signal delivery failed");
                                signal.status = SignalStatus::Failed;
                                signal.last_error = Some(e.to_string());
                            }
                        }
                    }
                    if let Err(e) = store.append_plan(&plan).await {
                        error!(plan_id = %request.plan_id, error = %e, "failed to persist signal status");
                    }
                }
            });
            join_all(sends).await;
        });

        self.dispatches.lock().insert(id, task);
    }
}
