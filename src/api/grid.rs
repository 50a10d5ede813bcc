//! Grid stress endpoint

use axum::{extract::State, Json};

use crate::{
    api::{error::ApiError, response::ApiResponse},
    app::AppState,
    planner::GridStressReport,
};

/// GET /api/v1/grid/stress - Current stress classification
pub async fn get_grid_stress(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<GridStressReport>>, ApiError> {
    let report = state.engine.grid_stress().await?;
    Ok(Json(ApiResponse::success(report)))
}
