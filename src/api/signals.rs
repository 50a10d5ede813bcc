//! Signal listing across plans.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    app::AppState,
    domain::{Signal, SignalFilter, SignalStatus},
};

#[derive(Debug, Default, Deserialize)]
pub struct ListSignalsQuery {
    pub plan_id: Option<Uuid>,
    pub status: Option<String>,
}

impl ListSignalsQuery {
    fn into_filter(self) -> Result<SignalFilter, ApiError> {
        let status = self
            .status
            .as_deref()
            .map(|raw| {
                SignalStatus::from_str(raw.trim())
                    .map_err(|_| ApiError::BadRequest(format!("unknown signal status '{raw}'")))
            })
            .transpose()?;
        Ok(SignalFilter {
            plan_id: self.plan_id,
            status,
        })
    }
}

/// GET /api/v1/signals - Signals across plans, most recently updated first
pub async fn list_signals(
    State(state): State<AppState>,
    Query(query): Query<ListSignalsQuery>,
) -> Result<Json<ApiResponse<Vec<Signal>>>, ApiError> {
    let filter = query.into_filter()?;
    let signals = state.lifecycle.list_signals(&filter).await;
    let count = signals.len();
    Ok(Json(ApiResponse::success(signals).with_count(count)))
}
