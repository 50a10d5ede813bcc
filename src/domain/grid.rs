use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{PlanningError, Provenance};

/// Point-in-time reading of system-wide grid conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub timestamp: DateTime<Utc>,
    pub system_load_mw: f64,
    pub capacity_mw: f64,
    pub reserves_mw: f64,
    pub price_per_mwh: f64,
    pub renewable_output_mw: f64,
    pub provenance: Provenance,
}

impl GridSnapshot {
    /// Reject readings the classifier cannot reason about.
    pub fn validate(&self) -> Result<(), PlanningError> {
        let fields = [
            ("system_load_mw", self.system_load_mw),
            ("capacity_mw", self.capacity_mw),
            ("reserves_mw", self.reserves_mw),
            ("price_per_mwh", self.price_per_mwh),
            ("renewable_output_mw", self.renewable_output_mw),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(PlanningError::DataUnavailable(format!(
                    "grid snapshot field {name} is invalid: {value}"
                )));
            }
        }
        if self.capacity_mw <= 0.0 {
            return Err(PlanningError::DataUnavailable(
                "grid snapshot capacity_mw must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Reserve margin as a percentage of installed capacity.
    pub fn reserve_margin_pct(&self) -> f64 {
        self.reserves_mw / self.capacity_mw * 100.0
    }
}

/// Hourly system load forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub generated_at: DateTime<Utc>,
    pub load_mw: Vec<f64>,
    pub peak_load_mw: f64,
    /// Hour of day (0-23) of the forecast peak.
    pub peak_hour: u32,
}

impl ForecastSeries {
    /// Build a series from hourly values starting at `generated_at`, deriving the peak.
    pub fn from_hourly(generated_at: DateTime<Utc>, load_mw: Vec<f64>) -> Self {
        use chrono::Timelike;

        let (peak_idx, peak_load_mw) = load_mw
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f64::MIN), |acc, (i, v)| if v > acc.1 { (i, v) } else { acc });
        let peak_load_mw = if load_mw.is_empty() { 0.0 } else { peak_load_mw };
        let peak_hour = (generated_at.hour() + peak_idx as u32) % 24;

        Self {
            generated_at,
            load_mw,
            peak_load_mw,
            peak_hour,
        }
    }

    pub fn validate(&self, expected_hours: usize) -> Result<(), PlanningError> {
        if self.load_mw.len() != expected_hours {
            return Err(PlanningError::DataUnavailable(format!(
                "forecast has {} entries, expected {}",
                self.load_mw.len(),
                expected_hours
            )));
        }
        if self.load_mw.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(PlanningError::DataUnavailable(
                "forecast contains invalid load values".to_string(),
            ));
        }
        let max = self.load_mw.iter().copied().fold(f64::MIN, f64::max);
        if !self.load_mw.is_empty() && (self.peak_load_mw - max).abs() > 1e-6 {
            return Err(PlanningError::DataUnavailable(format!(
                "forecast peak {} does not match series maximum {}",
                self.peak_load_mw, max
            )));
        }
        if self.peak_hour >= 24 {
            return Err(PlanningError::DataUnavailable(format!(
                "forecast peak_hour out of range: {}",
                self.peak_hour
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> GridSnapshot {
        GridSnapshot {
            timestamp: Utc.with_ymd_and_hms(2024, 7, 15, 14, 0, 0).unwrap(),
            system_load_mw: 65_000.0,
            capacity_mw: 80_000.0,
            reserves_mw: 8_000.0,
            price_per_mwh: 90.0,
            renewable_output_mw: 20_000.0,
            provenance: Provenance::Live,
        }
    }

    #[test]
    fn test_reserve_margin() {
        assert!((snapshot().reserve_margin_pct() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_validation() {
        assert!(snapshot().validate().is_ok());

        let mut bad = snapshot();
        bad.capacity_mw = 0.0;
        assert!(matches!(bad.validate(), Err(PlanningError::DataUnavailable(_))));

        let mut bad = snapshot();
        bad.price_per_mwh = f64::NAN;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_snapshot_age() {
        let s = snapshot();
        let now = s.timestamp + Duration::minutes(7);
        assert_eq!(s.age(now).num_minutes(), 7);
    }

    #[test]
    fn test_forecast_peak_derivation() {
        let start = Utc.with_ymd_and_hms(2024, 7, 15, 10, 0, 0).unwrap();
        let mut load = vec![60_000.0; 24];
        load[7] = 72_000.0;
        let f = ForecastSeries::from_hourly(start, load);
        assert_eq!(f.peak_load_mw, 72_000.0);
        assert_eq!(f.peak_hour, 17);
        assert!(f.validate(24).is_ok());
        assert!(f.validate(12).is_err());

        let mut inconsistent = f.clone();
        inconsistent.peak_load_mw = 65_000.0;
        assert!(inconsistent.validate(24).is_err());
    }
}
