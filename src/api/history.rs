//! Execution history of completed plans.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    app::AppState,
    lifecycle::{HistorySummary, PerformanceRecord},
};

const DEFAULT_DAYS: u32 = 30;
const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct HistorySummaryQuery {
    #[validate(range(min = 1, max = 365))]
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct HistoryQuery {
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<usize>,
}

/// GET /api/v1/history - Performance records, most recent first
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<PerformanceRecord>>>, ApiError> {
    query.validate()?;
    let records = state
        .lifecycle
        .performance_history(query.limit.unwrap_or(DEFAULT_LIMIT));
    let count = records.len();
    Ok(Json(ApiResponse::success(records).with_count(count)))
}

/// GET /api/v1/history/summary?days=N
pub async fn history_summary(
    State(state): State<AppState>,
    Query(query): Query<HistorySummaryQuery>,
) -> Result<Json<ApiResponse<HistorySummary>>, ApiError> {
    query.validate()?;
    let summary = state
        .lifecycle
        .history_summary(query.days.unwrap_or(DEFAULT_DAYS));
    Ok(Json(ApiResponse::success(summary)))
}
