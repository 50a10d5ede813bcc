//! Greedy distribution of a reduction target across eligible cohorts.
//!
//! Cohorts are filtered for notice time and weekly event caps, scored by the
//! requested strategy, then filled in score order (ties by ascending cohort
//! id) until the target is met or the cohorts run out.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use crate::config::AllocationConfig;
use crate::domain::{Cohort, PlanningError, Strategy};

const MW_EPSILON: f64 = 1e-9;

pub struct AllocationRequest<'a> {
    pub target_mw: f64,
    pub strategy: Strategy,
    pub cohorts: &'a [Cohort],
    pub now: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    /// Dispatches per cohort id within the rolling week.
    pub recent_events: &'a HashMap<String, u32>,
}

/// Why a cohort was left out before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Exclusion {
    InsufficientNotice { required_minutes: u32, lead_minutes: i64 },
    WeeklyEventCap { events: u32, max: u32 },
    NoCapacity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAllocation {
    pub cohort: Cohort,
    pub target_mw: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationOutcome {
    pub allocations: Vec<PlannedAllocation>,
    pub achieved_mw: f64,
    pub partial: bool,
    pub shortfall_mw: f64,
    /// Cohorts allocated despite insufficient notice (emergency only).
    pub notice_overrides: Vec<String>,
    pub excluded: Vec<(String, Exclusion)>,
}

struct Candidate<'a> {
    cohort: &'a Cohort,
    score: f64,
    short_notice: bool,
}

pub struct AllocationOptimizer {
    cfg: AllocationConfig,
}

impl AllocationOptimizer {
    pub fn new(cfg: AllocationConfig) -> Self {
        Self { cfg }
    }

    pub fn allocate(
        &self,
        req: &AllocationRequest<'_>,
    ) -> Result<AllocationOutcome, PlanningError> {
        if !req.target_mw.is_finite() || req.target_mw <= 0.0 {
            return Err(PlanningError::InvalidRequest(format!(
                "target_mw must be positive, got {}",
                req.target_mw
            )));
        }

        let lead_minutes = (req.window_start - req.now).num_minutes().max(0);
        let mut excluded = Vec::new();
        let mut eligible: Vec<(&Cohort, bool)> = Vec::new();

        for cohort in req.cohorts {
            if cohort.flexible_capacity_mw() <= 0.0 {
                excluded.push((cohort.id.clone(), Exclusion::NoCapacity));
                continue;
            }

            let events = req.recent_events.get(&cohort.id).copied().unwrap_or(0);
            if events >= self.cfg.max_events_per_week {
                excluded.push((
                    cohort.id.clone(),
                    Exclusion::WeeklyEventCap {
                        events,
                        max: self.cfg.max_events_per_week,
                    },
                ));
                continue;
            }

            let short_notice = i64::from(cohort.notice_time_minutes_required) > lead_minutes;
            if short_notice && req.strategy != Strategy::Emergency {
                excluded.push((
                    cohort.id.clone(),
                    Exclusion::InsufficientNotice {
                        required_minutes: cohort.notice_time_minutes_required,
                        lead_minutes,
                    },
                ));
                continue;
            }

            eligible.push((cohort, short_notice));
        }

        let max_capacity = eligible
            .iter()
            .map(|(c, _)| c.flexible_capacity_mw())
            .fold(0.0_f64, f64::max);

        let mut candidates: Vec<Candidate<'_>> = eligible
            .into_iter()
            .map(|(cohort, short_notice)| Candidate {
                cohort,
                score: self.score(req.strategy, cohort, max_capacity),
                short_notice,
            })
            .collect();

        candidates.sort_by(|a, b| Self::rank(req.strategy, a, b));

        let mut remaining = req.target_mw;
        let mut allocations = Vec::new();
        let mut notice_overrides = Vec::new();

        for candidate in candidates {
            if remaining <= MW_EPSILON {
                break;
            }
            let take = remaining.min(candidate.cohort.flexible_capacity_mw());
            remaining -= take;
            if candidate.short_notice {
                notice_overrides.push(candidate.cohort.id.clone());
            }
            debug!(
                cohort_id = %candidate.cohort.id,
                score = candidate.score,
                target_mw = take,
                "allocated"
            );
            allocations.push(PlannedAllocation {
                cohort: candidate.cohort.clone(),
                target_mw: take,
                score: candidate.score,
            });
        }

        let achieved_mw: f64 = allocations.iter().map(|a| a.target_mw).sum();
        let shortfall_mw = (req.target_mw - achieved_mw).max(0.0);
        let partial = shortfall_mw > MW_EPSILON;

        Ok(AllocationOutcome {
            allocations,
            achieved_mw,
            partial,
            shortfall_mw: if partial { shortfall_mw } else { 0.0 },
            notice_overrides,
            excluded,
        })
    }

    pub fn score(&self, strategy: Strategy, cohort: &Cohort, max_capacity_mw: f64) -> f64 {
        match strategy {
            Strategy::CostMinimize => {
                cohort.baseline_acceptance_rate * cohort.segment.price_responsiveness()
            }
            Strategy::Reliability => cohort.baseline_acceptance_rate,
            Strategy::Emergency => cohort.flexible_capacity_mw(),
            Strategy::Balanced => {
                let normalized = if max_capacity_mw > 0.0 {
                    cohort.flexible_capacity_mw() / max_capacity_mw
                } else {
                    0.0
                };
                self.cfg.balanced_acceptance_weight * cohort.baseline_acceptance_rate
                    + self.cfg.balanced_capacity_weight * normalized
            }
        }
    }

    /// Score descending; reliability then prefers shorter notice; finally cohort id ascending.
    fn rank(strategy: Strategy, a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
        let by_score = OrderedFloat(b.score).cmp(&OrderedFloat(a.score));
        let by_notice = if strategy == Strategy::Reliability {
            a.cohort
                .notice_time_minutes_required
                .cmp(&b.cohort.notice_time_minutes_required)
        } else {
            Ordering::Equal
        };
        by_score
            .then(by_notice)
            .then_with(|| a.cohort.id.cmp(&b.cohort.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Segment, WeatherSensitivity};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::{prop_assert, prop_oneof, proptest, Just};
    use rstest::rstest;

    fn cohort(id: &str, capacity_mw: f64, acceptance: f64) -> Cohort {
        Cohort {
            id: id.to_string(),
            name: format!("Cohort {id}"),
            segment: Segment::ResidentialStandard,
            num_accounts: 1_000,
            flex_kw_per_account: capacity_mw,
            baseline_acceptance_rate: acceptance,
            notice_time_minutes_required: 30,
            weather_sensitivity: WeatherSensitivity::None,
            peak_hours: vec![17, 18],
            comfort_limit_f: 2.0,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap()
    }

    fn run(
        target_mw: f64,
        strategy: Strategy,
        cohorts: &[Cohort],
        lead: Duration,
        recent: &HashMap<String, u32>,
    ) -> Result<AllocationOutcome, PlanningError> {
        AllocationOptimizer::new(AllocationConfig::default()).allocate(&AllocationRequest {
            target_mw,
            strategy,
            cohorts,
            now: now(),
            window_start: now() + lead,
            recent_events: recent,
        })
    }

    fn ids(outcome: &AllocationOutcome) -> Vec<&str> {
        outcome.allocations.iter().map(|a| a.cohort.id.as_str()).collect()
    }

    #[test]
    fn test_balanced_fills_best_cohort_first() {
        let cohorts = vec![cohort("A", 60.0, 0.8), cohort("B", 50.0, 0.6)];
        let out = run(
            100.0,
            Strategy::Balanced,
            &cohorts,
            Duration::hours(4),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(ids(&out), vec!["A", "B"]);
        assert!((out.allocations[0].target_mw - 60.0).abs() < 1e-9);
        assert!((out.allocations[1].target_mw - 40.0).abs() < 1e-9);
        assert!(!out.partial);
        assert_eq!(out.shortfall_mw, 0.0);
    }

    #[test]
    fn test_emergency_reports_shortfall() {
        let cohorts = vec![cohort("A", 50.0, 0.8), cohort("B", 30.0, 0.6)];
        let out = run(
            100.0,
            Strategy::Emergency,
            &cohorts,
            Duration::hours(4),
            &HashMap::new(),
        )
        .unwrap();
        assert!(out.partial);
        assert!((out.shortfall_mw - 20.0).abs() < 1e-9);
        assert!((out.achieved_mw - 80.0).abs() < 1e-9);
    }

    #[rstest]
    #[case(0.0)]
    #[case(-5.0)]
    #[case(f64::NAN)]
    fn test_rejects_non_positive_target(#[case] target: f64) {
        let cohorts = vec![cohort("A", 60.0, 0.8)];
        let result = run(target, Strategy::Balanced, &cohorts, Duration::hours(4), &HashMap::new());
        assert!(matches!(result, Err(PlanningError::InvalidRequest(_))));
    }

    #[test]
    fn test_empty_eligible_set_is_partial() {
        let out = run(
            25.0,
            Strategy::Reliability,
            &[],
            Duration::hours(4),
            &HashMap::new(),
        )
        .unwrap();
        assert!(out.allocations.is_empty());
        assert!(out.partial);
        assert_eq!(out.shortfall_mw, 25.0);
    }

    #[test]
    fn test_notice_filter_and_emergency_override() {
        let mut slow = cohort("slow", 40.0, 0.9);
        slow.notice_time_minutes_required = 240;
        let cohorts = vec![slow, cohort("fast", 20.0, 0.5)];

        let out = run(
            50.0,
            Strategy::Reliability,
            &cohorts,
            Duration::hours(1),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(ids(&out), vec!["fast"]);
        assert!(matches!(
            out.excluded.as_slice(),
            [(
                id,
                Exclusion::InsufficientNotice {
                    required_minutes: 240,
                    lead_minutes: 60
                }
            )] if id == "slow"
        ));

        let out = run(
            50.0,
            Strategy::Emergency,
            &cohorts,
            Duration::hours(1),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(ids(&out), vec!["slow", "fast"]);
        assert_eq!(out.notice_overrides, vec!["slow".to_string()]);
    }

    #[test]
    fn test_weekly_event_cap() {
        let cohorts = vec![cohort("A", 60.0, 0.8), cohort("B", 50.0, 0.6)];
        let recent = HashMap::from([("A".to_string(), 3)]);
        let out = run(30.0, Strategy::Balanced, &cohorts, Duration::hours(4), &recent).unwrap();
        assert_eq!(ids(&out), vec!["B"]);
        assert!(out.excluded.iter().any(|(id, e)| {
            id == "A" && matches!(e, Exclusion::WeeklyEventCap { events: 3, max: 3 })
        }));
    }

    #[test]
    fn test_ties_break_by_cohort_id() {
        let cohorts = vec![cohort("c", 10.0, 0.7), cohort("a", 10.0, 0.7), cohort("b", 10.0, 0.7)];
        let out = run(
            25.0,
            Strategy::Emergency,
            &cohorts,
            Duration::hours(4),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(ids(&out), vec!["a", "b", "c"]);
        assert!((out.allocations[2].target_mw - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_reliability_prefers_shorter_notice_on_tie() {
        let mut a = cohort("a", 10.0, 0.7);
        a.notice_time_minutes_required = 90;
        let mut b = cohort("b", 10.0, 0.7);
        b.notice_time_minutes_required = 15;
        let out = run(
            5.0,
            Strategy::Reliability,
            &[a, b],
            Duration::hours(4),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(ids(&out), vec!["b"]);
    }

    #[test]
    fn test_cost_minimize_prefers_price_responsive_segments() {
        let mut industrial = cohort("ind", 10.0, 0.7);
        industrial.segment = Segment::Industrial;
        let residential = cohort("res", 10.0, 0.8);
        let out = run(
            5.0,
            Strategy::CostMinimize,
            &[residential, industrial],
            Duration::hours(4),
            &HashMap::new(),
        )
        .unwrap();
        // 0.7 * 1.0 beats 0.8 * 0.5
        assert_eq!(ids(&out), vec!["ind"]);
    }

    #[test]
    fn test_zero_capacity_cohort_excluded() {
        let out = run(
            5.0,
            Strategy::Emergency,
            &[cohort("z", 0.0, 0.9)],
            Duration::hours(4),
            &HashMap::new(),
        )
        .unwrap();
        assert!(out.allocations.is_empty());
        assert_eq!(out.excluded, vec![("z".to_string(), Exclusion::NoCapacity)]);
    }

    fn strategy_strategy() -> impl proptest::strategy::Strategy<Value = Strategy> {
        prop_oneof![
            Just(Strategy::Balanced),
            Just(Strategy::CostMinimize),
            Just(Strategy::Reliability),
            Just(Strategy::Emergency),
        ]
    }

    proptest! {
        #[test]
        fn prop_allocation_respects_target_and_capacity(
            target in 0.1f64..500.0,
            strategy in strategy_strategy(),
            specs in proptest::collection::vec((0.0f64..80.0, 0.0f64..=1.0, 0u32..300), 0..8),
            lead_minutes in 0i64..480,
        ) {
            let cohorts: Vec<Cohort> = specs
                .iter()
                .enumerate()
                .map(|(i, (cap, acc, notice))| {
                    let mut c = cohort(&format!("c{i}"), *cap, *acc);
                    c.notice_time_minutes_required = *notice;
                    c
                })
                .collect();
            let out = run(
                target,
                strategy,
                &cohorts,
                Duration::minutes(lead_minutes),
                &HashMap::new(),
            )
            .unwrap();

            let total: f64 = out.allocations.iter().map(|a| a.target_mw).sum();
            let eligible_capacity: f64 = cohorts
                .iter()
                .filter(|c| !out.excluded.iter().any(|(id, _)| id == &c.id))
                .map(|c| c.flexible_capacity_mw())
                .sum();

            prop_assert!(total <= target + 1e-6);
            prop_assert!(total <= eligible_capacity + 1e-6);
            for a in &out.allocations {
                prop_assert!(a.target_mw >= 0.0);
                prop_assert!(a.target_mw <= a.cohort.flexible_capacity_mw() + 1e-9);
            }
            prop_assert!((total + out.shortfall_mw - target).abs() < 1e-6 || !out.partial);
        }
    }
}
