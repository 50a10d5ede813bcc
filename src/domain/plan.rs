use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::{Provenance, Strategy, StressLevel};

/// Lifecycle state of a DR plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanState {
    Proposed,
    Approved,
    Rejected,
    Dispatched,
    Completed,
    Expired,
}

impl PlanState {
    /// States that hold a claim on their window.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlanState::Proposed | PlanState::Approved | PlanState::Dispatched
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanState::Rejected | PlanState::Completed | PlanState::Expired
        )
    }
}

/// MW share of a plan assigned to one cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortAllocation {
    pub cohort_id: String,
    pub cohort_name: String,
    pub num_accounts: u32,
    pub target_mw: f64,
    pub acceptance_probability: f64,
    pub predicted_mw: f64,
    pub message_template: String,
}

/// Grid and weather conditions the plan was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationSummary {
    pub stress_level: StressLevel,
    pub stress_score: f64,
    pub reserve_margin_pct: f64,
    pub price_ratio: f64,
    pub system_load_mw: f64,
    pub reserves_mw: f64,
    pub price_per_mwh: f64,
    pub forecast_peak_mw: f64,
    pub forecast_peak_hour: u32,
    pub window_overlaps_peak: bool,
    pub snapshot_at: DateTime<Utc>,
    pub snapshot_provenance: Provenance,
    pub weather_region: String,
    pub temperature_f: f64,
    pub weather_provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SignalStatus {
    Pending,
    Acked,
    Failed,
}

/// Dispatch record for one cohort of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub plan_id: Uuid,
    pub cohort_id: String,
    pub status: SignalStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DRPlan {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub strategy: Strategy,
    pub state: PlanState,
    pub requested_target_mw: f64,
    pub target_mw_total: f64,
    pub predicted_mw_total: f64,
    pub confidence_score: f64,
    pub partial: bool,
    pub shortfall_mw: f64,
    pub cohort_allocations: Vec<CohortAllocation>,
    pub notice_overrides: Vec<String>,
    pub constraints_applied: Vec<String>,
    pub explanation: String,
    pub situation_summary: SituationSummary,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub operator_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub signals: Vec<Signal>,
}

impl DRPlan {
    /// Half-open window intersection: [a, b) and [c, d) overlap iff a < d && c < b.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.window_start < end && start < self.window_end
    }

    pub fn overlaps_plan(&self, other: &DRPlan) -> bool {
        self.overlaps(other.window_start, other.window_end)
    }

    pub fn failed_signals(&self) -> usize {
        self.signals
            .iter()
            .filter(|s| s.status == SignalStatus::Failed)
            .count()
    }
}

/// One state transition in a plan's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub plan_id: Uuid,
    /// `None` for the creating entry.
    pub from: Option<PlanState>,
    pub to: PlanState,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Filter for listing plans. Empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanFilter {
    pub state: Option<PlanState>,
    pub strategy: Option<Strategy>,
    /// Only plans whose window intersects [start, end).
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl PlanFilter {
    pub fn matches(&self, plan: &DRPlan) -> bool {
        self.state.map_or(true, |s| plan.state == s)
            && self.strategy.map_or(true, |s| plan.strategy == s)
            && self.window.map_or(true, |(start, end)| plan.overlaps(start, end))
    }
}

/// Filter for listing signals across plans.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalFilter {
    pub plan_id: Option<Uuid>,
    pub status: Option<SignalStatus>,
}

impl SignalFilter {
    pub fn matches(&self, signal: &Signal) -> bool {
        self.plan_id.map_or(true, |id| signal.plan_id == id)
            && self.status.map_or(true, |s| signal.status == s)
    }
}
