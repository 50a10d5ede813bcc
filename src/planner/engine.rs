use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::allocation::{AllocationOptimizer, AllocationRequest};
use super::explain::{self, ConstraintContext};
use super::flexibility::{self, FlexibilityEstimate};
use super::response::{plan_confidence, ResponsePredictor};
use super::stress::{StressAssessment, StressClassifier};
use crate::clock::Clock;
use crate::config::Config;
use crate::domain::{
    Cohort, CohortAllocation, DRPlan, GridSnapshot, PlanState, PlanningError, SituationSummary,
    Strategy,
};
use crate::lifecycle::PlanLifecycle;
use crate::providers::{CacheSource, Providers};

#[derive(Debug, Clone, PartialEq)]
pub struct ProposeRequest {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub strategy: Strategy,
    /// Restrict allocation to these cohorts.
    pub cohort_ids: Option<Vec<String>>,
    /// Explicit reduction target; defaults to the classifier's recommendation.
    pub target_mw: Option<f64>,
}

/// Current grid conditions as classified for operators.
#[derive(Debug, Clone, Serialize)]
pub struct GridStressReport {
    pub assessment: StressAssessment,
    pub snapshot: GridSnapshot,
    pub snapshot_source: CacheSource,
    pub snapshot_age_secs: i64,
}

/// Turns provider data into proposed plans and hands them to the lifecycle.
pub struct PlanningEngine {
    providers: Arc<Providers>,
    lifecycle: Arc<PlanLifecycle>,
    clock: Arc<dyn Clock>,
    classifier: StressClassifier,
    optimizer: AllocationOptimizer,
    predictor: ResponsePredictor,
    max_events_per_week: u32,
}

impl PlanningEngine {
    pub fn new(
        providers: Arc<Providers>,
        lifecycle: Arc<PlanLifecycle>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            providers,
            lifecycle,
            clock,
            classifier: StressClassifier::new(config.stress.clone()),
            optimizer: AllocationOptimizer::new(config.allocation.clone()),
            predictor: ResponsePredictor::new(config.response.clone()),
            max_events_per_week: config.allocation.max_events_per_week,
        }
    }

    #[instrument(skip(self, request), fields(strategy = %request.strategy))]
    pub async fn propose_plan(&self, request: ProposeRequest) -> Result<DRPlan, PlanningError> {
        let now = self.clock.now();
        Self::validate(&request, now)?;

        let region = self.providers.region().to_string();
        let (snapshot, forecast, weather, catalog) = tokio::try_join!(
            self.providers.snapshot(),
            self.providers.forecast(),
            self.providers.weather(&region),
            self.providers.cohorts(),
        )?;

        let candidates = Self::select_cohorts(catalog, request.cohort_ids.as_deref())?;
        let assessment = self.classifier.classify(&snapshot.value, &forecast.value);
        let requested_target_mw = request
            .target_mw
            .unwrap_or(assessment.recommended_target_mw);

        let recent_events = self.lifecycle.event_counts(now).await;
        let outcome = self.optimizer.allocate(&AllocationRequest {
            target_mw: requested_target_mw,
            strategy: request.strategy,
            cohorts: &candidates,
            now,
            window_start: request.window_start,
            recent_events: &recent_events,
        })?;

        let cohort_allocations: Vec<CohortAllocation> = outcome
            .allocations
            .iter()
            .map(|planned| {
                let probability = self.predictor.acceptance_probability(
                    &planned.cohort,
                    &weather.value,
                    now,
                    request.window_start,
                );
                CohortAllocation {
                    cohort_id: planned.cohort.id.clone(),
                    cohort_name: planned.cohort.name.clone(),
                    num_accounts: planned.cohort.num_accounts,
                    target_mw: planned.target_mw,
                    acceptance_probability: probability,
                    predicted_mw: planned.target_mw * probability,
                    message_template: explain::message_template(&planned.cohort, planned.target_mw),
                }
            })
            .collect();

        let confidence_score = plan_confidence(
            cohort_allocations
                .iter()
                .map(|a| (a.target_mw, a.acceptance_probability)),
        );
        let predicted_mw_total = cohort_allocations.iter().map(|a| a.predicted_mw).sum();

        let snap = &snapshot.value;
        let situation_summary = SituationSummary {
            stress_level: assessment.level,
            stress_score: assessment.score,
            reserve_margin_pct: assessment.reserve_margin_pct,
            price_ratio: assessment.price_ratio,
            system_load_mw: snap.system_load_mw,
            reserves_mw: snap.reserves_mw,
            price_per_mwh: snap.price_per_mwh,
            forecast_peak_mw: assessment.forecast_peak_mw,
            forecast_peak_hour: assessment.forecast_peak_hour,
            window_overlaps_peak: assessment
                .window_overlaps_peak(request.window_start, request.window_end),
            snapshot_at: snap.timestamp,
            snapshot_provenance: snap.provenance,
            weather_region: weather.value.region.clone(),
            temperature_f: weather.value.temperature_f,
            weather_provenance: weather.value.provenance,
        };

        let constraints_applied = explain::constraints_applied(&ConstraintContext {
            now,
            window_start: request.window_start,
            notice_overrides: &outcome.notice_overrides,
            shortfall_mw: outcome.shortfall_mw,
        });
        let explanation = explain::explanation(
            request.strategy,
            &cohort_allocations,
            &situation_summary,
            confidence_score,
        );

        let plan = DRPlan {
            id: Uuid::new_v4(),
            created_at: now,
            window_start: request.window_start,
            window_end: request.window_end,
            strategy: request.strategy,
            state: PlanState::Proposed,
            requested_target_mw,
            target_mw_total: outcome.achieved_mw,
            predicted_mw_total,
            confidence_score,
            partial: outcome.partial,
            shortfall_mw: outcome.shortfall_mw,
            cohort_allocations,
            notice_overrides: outcome.notice_overrides,
            constraints_applied,
            explanation,
            situation_summary,
            decided_at: None,
            decided_by: None,
            operator_notes: None,
            rejection_reason: None,
            signals: Vec::new(),
        };

        info!(
            plan_id = %plan.id,
            stress_level = %assessment.level,
            target_mw = plan.target_mw_total,
            predicted_mw = plan.predicted_mw_total,
            partial = plan.partial,
            excluded = outcome.excluded.len(),
            "plan built"
        );
        self.lifecycle.insert_proposed(plan).await
    }

    /// Classify current conditions without building a plan.
    pub async fn grid_stress(&self) -> Result<GridStressReport, PlanningError> {
        let (snapshot, forecast) =
            tokio::try_join!(self.providers.snapshot(), self.providers.forecast())?;
        let assessment = self.classifier.classify(&snapshot.value, &forecast.value);
        Ok(GridStressReport {
            assessment,
            snapshot_source: snapshot.source,
            snapshot_age_secs: snapshot.value.age(self.clock.now()).num_seconds(),
            snapshot: snapshot.value,
        })
    }

    /// Flexibility of one cohort right now, or `None` for an unknown id.
    pub async fn cohort_flexibility(
        &self,
        cohort_id: &str,
    ) -> Result<Option<FlexibilityEstimate>, PlanningError> {
        let catalog = self.providers.cohorts().await?;
        let Some(cohort) = catalog.into_iter().find(|c| c.id == cohort_id) else {
            return Ok(None);
        };
        let now = self.clock.now();
        let events = self
            .lifecycle
            .event_counts(now)
            .await
            .get(cohort_id)
            .copied()
            .unwrap_or(0);
        Ok(Some(flexibility::estimate(
            &cohort,
            now,
            events,
            self.max_events_per_week,
        )))
    }

    fn validate(request: &ProposeRequest, now: DateTime<Utc>) -> Result<(), PlanningError> {
        if request.window_end <= request.window_start {
            return Err(PlanningError::InvalidRequest(
                "window_end must be after window_start".to_string(),
            ));
        }
        // A started window would expire before anyone could approve it.
        if request.window_start <= now {
            return Err(PlanningError::InvalidRequest(
                "window has already started".to_string(),
            ));
        }
        if let Some(target) = request.target_mw {
            if !target.is_finite() || target <= 0.0 {
                return Err(PlanningError::InvalidRequest(format!(
                    "target_mw must be positive, got {target}"
                )));
            }
        }
        if matches!(&request.cohort_ids, Some(ids) if ids.is_empty()) {
            return Err(PlanningError::InvalidRequest(
                "cohort_ids must not be empty when given".to_string(),
            ));
        }
        Ok(())
    }

    fn select_cohorts(
        catalog: Vec<Cohort>,
        wanted: Option<&[String]>,
    ) -> Result<Vec<Cohort>, PlanningError> {
        let Some(wanted) = wanted else {
            return Ok(catalog);
        };
        let wanted: HashSet<&str> = wanted.iter().map(String::as_str).collect();
        let known: HashSet<&str> = catalog.iter().map(|c| c.id.as_str()).collect();

        let mut unknown: Vec<&str> = wanted.difference(&known).copied().collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(PlanningError::InvalidRequest(format!(
                "unknown cohort id(s): {}",
                unknown.join(", ")
            )));
        }
        Ok(catalog
            .into_iter()
            .filter(|c| wanted.contains(c.id.as_str()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Segment, WeatherSensitivity};
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap()
    }

    fn request(start_h: i64, end_h: i64) -> ProposeRequest {
        ProposeRequest {
            window_start: now() + Duration::hours(start_h),
            window_end: now() + Duration::hours(end_h),
            strategy: Strategy::Balanced,
            cohort_ids: None,
            target_mw: None,
        }
    }

    fn cohort(id: &str) -> Cohort {
        Cohort {
            id: id.into(),
            name: id.to_uppercase(),
            segment: Segment::Industrial,
            num_accounts: 10,
            flex_kw_per_account: 100.0,
            baseline_acceptance_rate: 0.9,
            notice_time_minutes_required: 60,
            weather_sensitivity: WeatherSensitivity::None,
            peak_hours: vec![],
            comfort_limit_f: 0.0,
        }
    }

    #[rstest]
    #[case(request(4, 4))]
    #[case(request(4, 3))]
    #[case(request(-3, -1))]
    #[case(request(-1, 1))]
    #[case(request(0, 1))]
    #[case(ProposeRequest { target_mw: Some(0.0), ..request(1, 2) })]
    #[case(ProposeRequest { target_mw: Some(f64::INFINITY), ..request(1, 2) })]
    #[case(ProposeRequest { cohort_ids: Some(vec![]), ..request(1, 2) })]
    fn test_rejects_invalid_requests(#[case] req: ProposeRequest) {
        assert!(matches!(
            PlanningEngine::validate(&req, now()),
            Err(PlanningError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_accepts_future_window() {
        assert!(PlanningEngine::validate(&request(1, 3), now()).is_ok());
    }

    #[test]
    fn test_select_cohorts() {
        let catalog = vec![cohort("a"), cohort("b"), cohort("c")];
        let picked = PlanningEngine::select_cohorts(
            catalog.clone(),
            Some(&["c".to_string(), "a".to_string()]),
        )
        .unwrap();
        assert_eq!(
            picked.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );

        let err = PlanningEngine::select_cohorts(
            catalog.clone(),
            Some(&["z".to_string(), "a".to_string()]),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: unknown cohort id(s): z");

        assert_eq!(PlanningEngine::select_cohorts(catalog.clone(), None).unwrap(), catalog);
    }
}
