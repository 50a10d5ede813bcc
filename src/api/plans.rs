//! Plan proposal, review and history endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    app::AppState,
    domain::{AuditEntry, DRPlan, PlanFilter, PlanState, Strategy},
    planner::ProposeRequest,
};

#[derive(Debug, Deserialize, Validate)]
pub struct ProposePlanRequest {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    #[validate(length(min = 1))]
    pub strategy: String,
    #[validate(length(min = 1))]
    pub cohort_ids: Option<Vec<String>>,
    #[validate(range(exclusive_min = 0.0))]
    pub target_mw: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApprovePlanRequest {
    #[validate(length(min = 1, max = 128))]
    pub operator_id: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectPlanRequest {
    #[validate(length(min = 1, max = 128))]
    pub operator_id: String,
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPlansQuery {
    pub state: Option<String>,
    pub strategy: Option<String>,
    /// With `window_end`, keep only plans overlapping [window_start, window_end).
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

impl ListPlansQuery {
    fn into_filter(self) -> Result<PlanFilter, ApiError> {
        let state = self
            .state
            .as_deref()
            .map(|raw| {
                PlanState::from_str(raw.trim())
                    .map_err(|_| ApiError::BadRequest(format!("unknown plan state '{raw}'")))
            })
            .transpose()?;
        let strategy = self.strategy.as_deref().map(Strategy::parse).transpose()?;
        let window = match (self.window_start, self.window_end) {
            (Some(start), Some(end)) if end > start => Some((start, end)),
            (None, None) => None,
            _ => {
                return Err(ApiError::BadRequest(
                    "window_start and window_end must be given together, end after start".to_string(),
                ))
            }
        };
        Ok(PlanFilter {
            state,
            strategy,
            window,
        })
    }
}

/// POST /api/v1/plans - Propose a plan for a window
pub async fn propose_plan(
    State(state): State<AppState>,
    Json(req): Json<ProposePlanRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DRPlan>>), ApiError> {
    req.validate()?;
    let strategy = Strategy::parse(&req.strategy)?;

    let plan = state
        .engine
        .propose_plan(ProposeRequest {
            window_start: req.window_start,
            window_end: req.window_end,
            strategy,
            cohort_ids: req.cohort_ids,
            target_mw: req.target_mw,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(plan))))
}

/// GET /api/v1/plans - List plans, newest first
pub async fn list_plans(
    State(state): State<AppState>,
    Query(query): Query<ListPlansQuery>,
) -> Result<Json<ApiResponse<Vec<DRPlan>>>, ApiError> {
    let filter = query.into_filter()?;
    let plans = state.lifecycle.list_plans(&filter).await;
    let count = plans.len();
    Ok(Json(ApiResponse::success(plans).with_count(count)))
}

/// GET /api/v1/plans/:id
pub async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DRPlan>>, ApiError> {
    let plan = state.lifecycle.plan_status(id).await?;
    Ok(Json(ApiResponse::success(plan)))
}

/// POST /api/v1/plans/:id/approve - Approve and dispatch
pub async fn approve_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApprovePlanRequest>,
) -> Result<Json<ApiResponse<DRPlan>>, ApiError> {
    req.validate()?;
    let plan = state
        .lifecycle
        .approve_plan(id, &req.operator_id, req.notes)
        .await?;
    Ok(Json(ApiResponse::success(plan)))
}

/// POST /api/v1/plans/:id/reject
pub async fn reject_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectPlanRequest>,
) -> Result<Json<ApiResponse<DRPlan>>, ApiError> {
    req.validate()?;
    let plan = state
        .lifecycle
        .reject_plan(id, &req.operator_id, &req.reason)
        .await?;
    Ok(Json(ApiResponse::success(plan)))
}

/// GET /api/v1/plans/:id/audit - Transition history
pub async fn plan_audit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<AuditEntry>>>, ApiError> {
    let entries = state.lifecycle.audit_log(id).await?;
    let count = entries.len();
    Ok(Json(ApiResponse::success(entries).with_count(count)))
}
