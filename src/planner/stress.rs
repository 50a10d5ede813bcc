use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StressConfig;
use crate::domain::{ForecastSeries, GridSnapshot, StressLevel};

/// Classifier output for one snapshot/forecast pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressAssessment {
    pub level: StressLevel,
    pub score: f64,
    pub reserve_margin_pct: f64,
    pub price_ratio: f64,
    pub recommended_target_mw: f64,
    pub forecast_peak_mw: f64,
    pub forecast_peak_hour: u32,
}

impl StressAssessment {
    /// Whether the forecast peak hour falls inside [start, end).
    pub fn window_overlaps_peak(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let mut hour_start = start
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(start);
        while hour_start < end {
            if hour_start.hour() == self.forecast_peak_hour && hour_start + chrono::Duration::hours(1) > start {
                return true;
            }
            hour_start += chrono::Duration::hours(1);
            if hour_start - start > chrono::Duration::hours(24) {
                break;
            }
        }
        false
    }
}

pub struct StressClassifier {
    cfg: StressConfig,
}

impl StressClassifier {
    pub fn new(cfg: StressConfig) -> Self {
        Self { cfg }
    }

    pub fn classify(&self, snapshot: &GridSnapshot, forecast: &ForecastSeries) -> StressAssessment {
        let reserve_margin_pct = snapshot.reserve_margin_pct();
        let price_ratio = if self.cfg.baseline_price_per_mwh > 0.0 {
            snapshot.price_per_mwh / self.cfg.baseline_price_per_mwh
        } else {
            1.0
        };

        let reserve_term = 1.0 - reserve_margin_pct / self.cfg.target_margin_pct;
        let price_term = (price_ratio - 1.0).max(0.0);
        let raw = self.cfg.reserve_weight * reserve_term + self.cfg.price_weight * price_term;
        let score = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 1.0 };

        StressAssessment {
            level: self.level_for(score),
            score,
            reserve_margin_pct,
            price_ratio,
            recommended_target_mw: (score * self.cfg.max_relief_mw).max(self.cfg.min_target_mw),
            forecast_peak_mw: forecast.peak_load_mw,
            forecast_peak_hour: forecast.peak_hour,
        }
    }

    /// Scores sitting exactly on a threshold take the higher level.
    pub fn level_for(&self, score: f64) -> StressLevel {
        if score >= self.cfg.critical_threshold {
            StressLevel::Critical
        } else if score >= self.cfg.high_threshold {
            StressLevel::High
        } else if score >= self.cfg.moderate_threshold {
            StressLevel::Moderate
        } else {
            StressLevel::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Provenance;
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    fn snapshot(reserves_mw: f64, price: f64) -> GridSnapshot {
        GridSnapshot {
            timestamp: Utc.with_ymd_and_hms(2024, 7, 15, 14, 0, 0).unwrap(),
            system_load_mw: 70_000.0,
            capacity_mw: 100_000.0,
            reserves_mw,
            price_per_mwh: price,
            renewable_output_mw: 15_000.0,
            provenance: Provenance::Live,
        }
    }

    fn forecast() -> ForecastSeries {
        let start = Utc.with_ymd_and_hms(2024, 7, 15, 0, 0, 0).unwrap();
        let load = (0..24).map(|h| if h == 17 { 74_000.0 } else { 60_000.0 }).collect();
        ForecastSeries::from_hourly(start, load)
    }

    #[test]
    fn test_ample_reserves_cheap_power_is_normal() {
        let classifier = StressClassifier::new(StressConfig::default());
        let a = classifier.classify(&snapshot(20_000.0, 30.0), &forecast());
        assert_eq!(a.score, 0.0);
        assert_eq!(a.level, StressLevel::Normal);
        assert_eq!(a.recommended_target_mw, StressConfig::default().min_target_mw);
        assert_eq!(a.forecast_peak_hour, 17);
    }

    #[test]
    fn test_score_formula() {
        // margin 6% of target 15% -> reserve term 0.6; price 75/50 -> price term 0.5
        let classifier = StressClassifier::new(StressConfig::default());
        let a = classifier.classify(&snapshot(6_000.0, 75.0), &forecast());
        let expected = 0.7 * 0.6 + 0.3 * 0.5;
        assert!((a.score - expected).abs() < 1e-9);
        assert_eq!(a.level, StressLevel::High);
        assert!((a.recommended_target_mw - expected * 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_clamped() {
        let classifier = StressClassifier::new(StressConfig::default());
        let a = classifier.classify(&snapshot(0.0, 5_000.0), &forecast());
        assert_eq!(a.score, 1.0);
        assert_eq!(a.level, StressLevel::Critical);
    }

    #[rstest]
    #[case(0.0, StressLevel::Normal)]
    #[case(0.2499, StressLevel::Normal)]
    #[case(0.25, StressLevel::Moderate)]
    #[case(0.5, StressLevel::High)]
    #[case(0.75, StressLevel::Critical)]
    #[case(1.0, StressLevel::Critical)]
    fn test_thresholds_break_upward(#[case] score: f64, #[case] expected: StressLevel) {
        let classifier = StressClassifier::new(StressConfig::default());
        assert_eq!(classifier.level_for(score), expected);
    }

    #[test]
    fn test_window_overlaps_peak() {
        let classifier = StressClassifier::new(StressConfig::default());
        let a = classifier.classify(&snapshot(10_000.0, 50.0), &forecast());
        let day = Utc.with_ymd_and_hms(2024, 7, 15, 0, 0, 0).unwrap();
        assert!(a.window_overlaps_peak(day + Duration::hours(16), day + Duration::hours(18)));
        assert!(a.window_overlaps_peak(
            day + Duration::minutes(17 * 60 + 30),
            day + Duration::hours(19)
        ));
        assert!(!a.window_overlaps_peak(day + Duration::hours(13), day + Duration::hours(17)));
        assert!(!a.window_overlaps_peak(day + Duration::hours(18), day + Duration::hours(20)));
    }
}
