//! Execution history: what each completed plan delivered, and rollups over a
//! trailing window of days.
//!
//! Delivery is estimated from the plan itself: a cohort whose signal was
//! acknowledged is credited with its predicted MW, a cohort whose signal
//! failed is credited with nothing.

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{DRPlan, SignalStatus, Strategy};

const BEST_COHORTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortDelivery {
    pub cohort_id: String,
    pub cohort_name: String,
    pub target_mw: f64,
    pub predicted_mw: f64,
    pub delivered_mw: f64,
    /// `None` when the allocation carried no signal.
    pub signal_status: Option<SignalStatus>,
}

/// Outcome of one plan, written when it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub plan_id: Uuid,
    pub strategy: Strategy,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub target_mw: f64,
    pub predicted_mw: f64,
    pub delivered_mw: f64,
    /// delivered / target, 0 for a zero target.
    pub target_achievement_rate: f64,
    pub signals_acked: usize,
    pub signals_failed: usize,
    pub cohorts: Vec<CohortDelivery>,
}

impl PerformanceRecord {
    pub fn from_plan(plan: &DRPlan, completed_at: DateTime<Utc>) -> Self {
        let cohorts: Vec<CohortDelivery> = plan
            .cohort_allocations
            .iter()
            .map(|allocation| {
                let signal_status = plan
                    .signals
                    .iter()
                    .find(|s| s.cohort_id == allocation.cohort_id)
                    .map(|s| s.status);
                let delivered_mw = match signal_status {
                    Some(SignalStatus::Acked) => allocation.predicted_mw,
                    _ => 0.0,
                };
                CohortDelivery {
                    cohort_id: allocation.cohort_id.clone(),
                    cohort_name: allocation.cohort_name.clone(),
                    target_mw: allocation.target_mw,
                    predicted_mw: allocation.predicted_mw,
                    delivered_mw,
                    signal_status,
                }
            })
            .collect();

        let delivered_mw: f64 = cohorts.iter().map(|c| c.delivered_mw).sum();
        let count = |status: SignalStatus| {
            plan.signals.iter().filter(|s| s.status == status).count()
        };

        Self {
            plan_id: plan.id,
            strategy: plan.strategy,
            window_start: plan.window_start,
            window_end: plan.window_end,
            completed_at,
            target_mw: plan.target_mw_total,
            predicted_mw: plan.predicted_mw_total,
            delivered_mw,
            target_achievement_rate: if plan.target_mw_total > 0.0 {
                delivered_mw / plan.target_mw_total
            } else {
                0.0
            },
            signals_acked: count(SignalStatus::Acked),
            signals_failed: count(SignalStatus::Failed),
            cohorts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortPerformance {
    pub cohort_id: String,
    pub cohort_name: String,
    pub events: usize,
    pub average_delivered_mw: f64,
}

/// Rollup of the plans completed in the last `days` days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub days: u32,
    pub since: DateTime<Utc>,
    pub total_plans: usize,
    /// Plans where every signal was acknowledged.
    pub fully_delivered_plans: usize,
    pub plans_with_failed_signals: usize,
    pub average_achievement_rate: f64,
    pub total_delivered_mw: f64,
    pub peak_delivered_mw: f64,
    pub best_performing_cohorts: Vec<CohortPerformance>,
}

impl HistorySummary {
    pub fn over(records: &[PerformanceRecord], now: DateTime<Utc>, days: u32) -> Self {
        let since = now - Duration::days(i64::from(days));
        let recent: Vec<&PerformanceRecord> =
            records.iter().filter(|r| r.completed_at >= since).collect();

        let total_plans = recent.len();
        let average_achievement_rate = if total_plans == 0 {
            0.0
        } else {
            recent.iter().map(|r| r.target_achievement_rate).sum::<f64>() / total_plans as f64
        };

        let best_performing_cohorts = recent
            .iter()
            .flat_map(|r| r.cohorts.iter())
            .into_group_map_by(|c| c.cohort_id.clone())
            .into_iter()
            .map(|(cohort_id, deliveries)| CohortPerformance {
                cohort_name: deliveries[0].cohort_name.clone(),
                events: deliveries.len(),
                average_delivered_mw: deliveries.iter().map(|d| d.delivered_mw).sum::<f64>()
                    / deliveries.len() as f64,
                cohort_id,
            })
            .sorted_by(|a, b| {
                OrderedFloat(b.average_delivered_mw)
                    .cmp(&OrderedFloat(a.average_delivered_mw))
                    .then_with(|| a.cohort_id.cmp(&b.cohort_id))
            })
            .take(BEST_COHORTS)
            .collect();

        Self {
            days,
            since,
            total_plans,
            fully_delivered_plans: recent
                .iter()
                .filter(|r| r.signals_failed == 0 && r.signals_acked > 0)
                .count(),
            plans_with_failed_signals: recent.iter().filter(|r| r.signals_failed > 0).count(),
            average_achievement_rate,
            total_delivered_mw: recent.iter().map(|r| r.delivered_mw).sum(),
            peak_delivered_mw: recent.iter().map(|r| r.delivered_mw).fold(0.0, f64::max),
            best_performing_cohorts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CohortAllocation, PlanState, Provenance, Signal, SituationSummary, StressLevel,
    };
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap()
    }

    fn allocation(id: &str, target_mw: f64, predicted_mw: f64) -> CohortAllocation {
        CohortAllocation {
            cohort_id: id.into(),
            cohort_name: id.to_uppercase(),
            num_accounts: 500,
            target_mw,
            acceptance_probability: predicted_mw / target_mw,
            predicted_mw,
            message_template: String::new(),
        }
    }

    fn completed_plan(signals: &[(&str, SignalStatus)]) -> DRPlan {
        let id = Uuid::new_v4();
        DRPlan {
            id,
            created_at: t0(),
            window_start: t0() + Duration::hours(4),
            window_end: t0() + Duration::hours(6),
            strategy: Strategy::Balanced,
            state: PlanState::Completed,
            requested_target_mw: 100.0,
            target_mw_total: 100.0,
            predicted_mw_total: 72.0,
            confidence_score: 0.7,
            partial: false,
            shortfall_mw: 0.0,
            cohort_allocations: vec![allocation("a", 60.0, 48.0), allocation("b", 40.0, 24.0)],
            notice_overrides: vec![],
            constraints_applied: vec![],
            explanation: String::new(),
            situation_summary: SituationSummary {
                stress_level: StressLevel::High,
                stress_score: 0.6,
                reserve_margin_pct: 6.0,
                price_ratio: 1.8,
                system_load_mw: 70_000.0,
                reserves_mw: 4_500.0,
                price_per_mwh: 90.0,
                forecast_peak_mw: 74_000.0,
                forecast_peak_hour: 17,
                window_overlaps_peak: true,
                snapshot_at: t0(),
                snapshot_provenance: Provenance::Synthetic,
                weather_region: "austin".into(),
                temperature_f: 101.0,
                weather_provenance: Provenance::Synthetic,
            },
            decided_at: Some(t0()),
            decided_by: Some("op".into()),
            operator_notes: None,
            rejection_reason: None,
            signals: signals
                .iter()
                .map(|(cohort, status)| Signal {
                    plan_id: id,
                    cohort_id: cohort.to_string(),
                    status: *status,
                    attempt_count: 1,
                    last_error: None,
                    updated_at: t0(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_record_credits_only_acked_cohorts() {
        let plan = completed_plan(&[("a", SignalStatus::Acked), ("b", SignalStatus::Failed)]);
        let record = PerformanceRecord::from_plan(&plan, t0() + Duration::hours(6));

        assert_eq!(record.delivered_mw, 48.0);
        assert!((record.target_achievement_rate - 0.48).abs() < 1e-9);
        assert_eq!((record.signals_acked, record.signals_failed), (1, 1));
        assert_eq!(record.cohorts[1].signal_status, Some(SignalStatus::Failed));
        assert_eq!(record.cohorts[1].delivered_mw, 0.0);
    }

    #[test]
    fn test_summary_window_and_ranking() {
        let all_acked = completed_plan(&[("a", SignalStatus::Acked), ("b", SignalStatus::Acked)]);
        let b_failed = completed_plan(&[("a", SignalStatus::Acked), ("b", SignalStatus::Failed)]);
        let now = t0() + Duration::days(10);
        let records = vec![
            PerformanceRecord::from_plan(&all_acked, now - Duration::days(2)),
            PerformanceRecord::from_plan(&b_failed, now - Duration::days(1)),
            // outside a 7 day window
            PerformanceRecord::from_plan(&all_acked, now - Duration::days(9)),
        ];

        let summary = HistorySummary::over(&records, now, 7);
        assert_eq!(summary.total_plans, 2);
        assert_eq!(summary.fully_delivered_plans, 1);
        assert_eq!(summary.plans_with_failed_signals, 1);
        assert!((summary.total_delivered_mw - 120.0).abs() < 1e-9);
        assert!((summary.peak_delivered_mw - 72.0).abs() < 1e-9);
        assert!((summary.average_achievement_rate - 0.6).abs() < 1e-9);

        let best: Vec<_> = summary
            .best_performing_cohorts
            .iter()
            .map(|c| (c.cohort_id.as_str(), c.events, c.average_delivered_mw))
            .collect();
        assert_eq!(best, vec![("a", 2, 48.0), ("b", 2, 12.0)]);

        assert_eq!(HistorySummary::over(&records, now, 30).total_plans, 3);
    }

    #[test]
    fn test_empty_summary() {
        let summary = HistorySummary::over(&[], t0(), 30);
        assert_eq!(summary.total_plans, 0);
        assert_eq!(summary.average_achievement_rate, 0.0);
        assert!(summary.best_performing_cohorts.is_empty());
    }
}
