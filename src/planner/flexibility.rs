//! Point-in-time flexibility estimate for a single cohort, derived from its
//! catalog entry and the hour of day.

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use crate::domain::Cohort;

const PEAK_AVAILABILITY: f64 = 0.9;
const OFF_PEAK_AVAILABILITY: f64 = 0.5;
const PEAK_CONFIDENCE: f64 = 0.85;
const OFF_PEAK_CONFIDENCE: f64 = 0.65;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlexibilityEstimate {
    pub cohort_id: String,
    pub assessed_at: DateTime<Utc>,
    pub in_peak_hours: bool,
    /// Share of the cohort's flexible capacity expected to be reachable now.
    pub availability: f64,
    pub available_mw: f64,
    pub confidence: f64,
    pub participation_estimate: f64,
    pub events_this_week: u32,
    pub events_remaining: u32,
    pub constraints: Vec<String>,
}

/// Estimate how much of `cohort` could be called on at `now`.
///
/// Cohorts are most reachable during their own peak hours, when the loads
/// that can be curtailed are actually running.
pub fn estimate(
    cohort: &Cohort,
    now: DateTime<Utc>,
    events_this_week: u32,
    max_events_per_week: u32,
) -> FlexibilityEstimate {
    let in_peak_hours = cohort.peak_hours.iter().any(|h| u32::from(*h) == now.hour());
    let (availability, confidence) = if in_peak_hours {
        (PEAK_AVAILABILITY, PEAK_CONFIDENCE)
    } else {
        (OFF_PEAK_AVAILABILITY, OFF_PEAK_CONFIDENCE)
    };

    let mut constraints = vec![
        format!("Max {max_events_per_week} events per week"),
        format!("Min {} minutes notice", cohort.notice_time_minutes_required),
    ];
    if cohort.comfort_limit_f > 0.0 {
        constraints.push(format!("Comfort limit {}°F", cohort.comfort_limit_f));
    }

    FlexibilityEstimate {
        cohort_id: cohort.id.clone(),
        assessed_at: now,
        in_peak_hours,
        availability,
        available_mw: cohort.flexible_capacity_mw() * availability,
        confidence,
        participation_estimate: cohort.baseline_acceptance_rate * availability,
        events_this_week,
        events_remaining: max_events_per_week.saturating_sub(events_this_week),
        constraints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Segment, WeatherSensitivity};
    use chrono::TimeZone;

    fn cohort() -> Cohort {
        Cohort {
            id: "res-ac".into(),
            name: "Residential AC".into(),
            segment: Segment::ResidentialStandard,
            num_accounts: 20_000,
            flex_kw_per_account: 1.5,
            baseline_acceptance_rate: 0.7,
            notice_time_minutes_required: 60,
            weather_sensitivity: WeatherSensitivity::Heat,
            peak_hours: vec![16, 17, 18, 19],
            comfort_limit_f: 4.0,
        }
    }

    #[test]
    fn test_peak_hour_estimate() {
        let now = Utc.with_ymd_and_hms(2024, 7, 15, 17, 30, 0).unwrap();
        let est = estimate(&cohort(), now, 1, 3);
        assert!(est.in_peak_hours);
        assert!((est.available_mw - 27.0).abs() < 1e-9);
        assert!((est.participation_estimate - 0.63).abs() < 1e-9);
        assert_eq!(est.confidence, PEAK_CONFIDENCE);
        assert_eq!(est.events_remaining, 2);
        assert_eq!(
            est.constraints,
            vec![
                "Max 3 events per week".to_string(),
                "Min 60 minutes notice".to_string(),
                "Comfort limit 4°F".to_string(),
            ]
        );
    }

    #[test]
    fn test_off_peak_estimate() {
        let mut c = cohort();
        c.comfort_limit_f = 0.0;
        let now = Utc.with_ymd_and_hms(2024, 7, 15, 3, 0, 0).unwrap();
        let est = estimate(&c, now, 5, 3);
        assert!(!est.in_peak_hours);
        assert!((est.available_mw - 15.0).abs() < 1e-9);
        assert_eq!(est.confidence, OFF_PEAK_CONFIDENCE);
        assert_eq!(est.events_remaining, 0);
        assert_eq!(est.constraints.len(), 2);
    }
}
