//! Cohort catalog endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    app::AppState,
    domain::{Cohort, Segment},
    planner::FlexibilityEstimate,
};

#[derive(Debug, Serialize, PartialEq)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub cohorts: usize,
    pub accounts: u64,
    pub flex_mw: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CohortSummary {
    pub total_cohorts: usize,
    pub total_accounts: u64,
    pub total_flex_mw: f64,
    pub segments: Vec<SegmentSummary>,
}

impl CohortSummary {
    pub fn from_cohorts(cohorts: &[Cohort]) -> Self {
        let segments: Vec<SegmentSummary> = cohorts
            .iter()
            .into_group_map_by(|c| c.segment)
            .into_iter()
            .sorted_by_key(|(segment, _)| *segment)
            .map(|(segment, members)| SegmentSummary {
                segment,
                cohorts: members.len(),
                accounts: members.iter().map(|c| u64::from(c.num_accounts)).sum(),
                flex_mw: members.iter().map(|c| c.flexible_capacity_mw()).sum(),
            })
            .collect();

        Self {
            total_cohorts: cohorts.len(),
            total_accounts: segments.iter().map(|s| s.accounts).sum(),
            total_flex_mw: segments.iter().map(|s| s.flex_mw).sum(),
            segments,
        }
    }
}

/// GET /api/v1/cohorts
pub async fn list_cohorts(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Cohort>>>, ApiError> {
    let cohorts = state.providers.cohorts().await?;
    let count = cohorts.len();
    Ok(Json(ApiResponse::success(cohorts).with_count(count)))
}

/// GET /api/v1/cohorts/:id
pub async fn get_cohort(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Cohort>>, ApiError> {
    let cohort = state
        .providers
        .cohorts()
        .await?
        .into_iter()
        .find(|c| c.id == id)
        .ok_or_else(|| ApiError::NotFound(format!("Cohort {id}")))?;
    Ok(Json(ApiResponse::success(cohort)))
}

/// GET /api/v1/cohorts/:id/flexibility - What the cohort could deliver right now
pub async fn cohort_flexibility(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<FlexibilityEstimate>>, ApiError> {
    let estimate = state
        .engine
        .cohort_flexibility(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Cohort {id}")))?;
    Ok(Json(ApiResponse::success(estimate)))
}

/// GET /api/v1/cohorts/summary - Totals per segment
pub async fn cohort_summary(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<CohortSummary>>, ApiError> {
    let cohorts = state.providers.cohorts().await?;
    Ok(Json(ApiResponse::success(CohortSummary::from_cohorts(&cohorts))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WeatherSensitivity;

    fn cohort(id: &str, segment: Segment, accounts: u32, kw: f64) -> Cohort {
        Cohort {
            id: id.into(),
            name: id.into(),
            segment,
            num_accounts: accounts,
            flex_kw_per_account: kw,
            baseline_acceptance_rate: 0.5,
            notice_time_minutes_required: 30,
            weather_sensitivity: WeatherSensitivity::None,
            peak_hours: vec![],
            comfort_limit_f: 2.0,
        }
    }

    #[test]
    fn test_summary_groups_by_segment() {
        let summary = CohortSummary::from_cohorts(&[
            cohort("ev1", Segment::ResidentialEv, 1_000, 5.0),
            cohort("ind", Segment::Industrial, 10, 500.0),
            cohort("ev2", Segment::ResidentialEv, 3_000, 5.0),
        ]);
        assert_eq!(summary.total_cohorts, 3);
        assert_eq!(summary.total_accounts, 4_010);
        assert!((summary.total_flex_mw - 25.0).abs() < 1e-9);
        assert_eq!(summary.segments.len(), 2);
        assert_eq!(summary.segments[0].segment, Segment::ResidentialEv);
        assert_eq!(summary.segments[0].cohorts, 2);
        assert!((summary.segments[0].flex_mw - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary() {
        let summary = CohortSummary::from_cohorts(&[]);
        assert_eq!(summary.total_cohorts, 0);
        assert!(summary.segments.is_empty());
    }
}
