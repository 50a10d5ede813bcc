use thiserror::Error;
use uuid::Uuid;

use super::PlanState;

/// Errors surfaced by the planning core to its callers.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Plan {plan_id} is {state}, expected {expected}")]
    InvalidState {
        plan_id: Uuid,
        state: PlanState,
        expected: PlanState,
    },

    #[error("Plan {plan_id} overlaps active plan {conflicting_id}")]
    OverlapConflict { plan_id: Uuid, conflicting_id: Uuid },

    #[error("Snapshot used by plan {plan_id} is {age_secs}s old (limit {limit_secs}s); re-propose with fresh data")]
    StaleData {
        plan_id: Uuid,
        age_secs: i64,
        limit_secs: i64,
    },

    #[error("Plan not found: {0}")]
    NotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for PlanningError {
    fn from(error: std::io::Error) -> Self {
        PlanningError::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for PlanningError {
    fn from(error: serde_json::Error) -> Self {
        PlanningError::Storage(error.to_string())
    }
}
