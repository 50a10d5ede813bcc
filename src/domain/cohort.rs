use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use super::{Segment, WeatherSensitivity};

/// Cohort catalog ingestion errors
#[derive(Debug, Error)]
pub enum CohortError {
    #[error("Cohort {id}: {reason}")]
    Invalid { id: String, reason: String },
    #[error("Duplicate cohort id: {0}")]
    Duplicate(String),
    #[error("Cohort catalog unreadable: {0}")]
    Unreadable(String),
}

/// A group of customer accounts sharing flexibility characteristics.
///
/// Every field is required on the wire; a catalog entry missing e.g. its
/// acceptance rate fails to deserialize instead of being defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cohort {
    pub id: String,
    pub name: String,
    pub segment: Segment,
    pub num_accounts: u32,
    pub flex_kw_per_account: f64,
    pub baseline_acceptance_rate: f64,
    pub notice_time_minutes_required: u32,
    pub weather_sensitivity: WeatherSensitivity,
    /// Typical peak usage hours (0-23).
    pub peak_hours: Vec<u8>,
    /// Maximum HVAC setpoint adjustment customers tolerate, in °F.
    pub comfort_limit_f: f64,
}

impl Cohort {
    pub fn flexible_capacity_mw(&self) -> f64 {
        self.num_accounts as f64 * self.flex_kw_per_account / 1000.0
    }

    pub fn validate(&self) -> Result<(), CohortError> {
        let invalid = |reason: String| CohortError::Invalid {
            id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        if !self.flex_kw_per_account.is_finite() || self.flex_kw_per_account < 0.0 {
            return Err(invalid(format!(
                "flex_kw_per_account must be non-negative, got {}",
                self.flex_kw_per_account
            )));
        }
        if !(0.0..=1.0).contains(&self.baseline_acceptance_rate) {
            return Err(invalid(format!(
                "baseline_acceptance_rate must be within [0, 1], got {}",
                self.baseline_acceptance_rate
            )));
        }
        if let Some(h) = self.peak_hours.iter().find(|h| **h >= 24) {
            return Err(invalid(format!("invalid peak hour {h}")));
        }
        if !self.comfort_limit_f.is_finite() || self.comfort_limit_f < 0.0 {
            return Err(invalid(format!(
                "comfort_limit_f must be non-negative, got {}",
                self.comfort_limit_f
            )));
        }
        Ok(())
    }
}

/// Validate a whole catalog: per-record checks plus id uniqueness.
pub fn validate_catalog(cohorts: &[Cohort]) -> Result<(), CohortError> {
    let mut seen = HashSet::new();
    for cohort in cohorts {
        cohort.validate()?;
        if !seen.insert(cohort.id.as_str()) {
            return Err(CohortError::Duplicate(cohort.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cohort(id: &str) -> Cohort {
        Cohort {
            id: id.to_string(),
            name: "Austin EV owners".to_string(),
            segment: Segment::ResidentialEv,
            num_accounts: 12_000,
            flex_kw_per_account: 3.5,
            baseline_acceptance_rate: 0.72,
            notice_time_minutes_required: 60,
            weather_sensitivity: WeatherSensitivity::None,
            peak_hours: vec![18, 19, 20],
            comfort_limit_f: 2.0,
        }
    }

    #[test]
    fn test_flexible_capacity() {
        assert!((cohort("a").flexible_capacity_mw() - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_out_of_range_acceptance() {
        let mut c = cohort("a");
        c.baseline_acceptance_rate = 1.2;
        assert!(matches!(c.validate(), Err(CohortError::Invalid { .. })));
    }

    #[test]
    fn test_rejects_duplicates() {
        let result = validate_catalog(&[cohort("a"), cohort("a")]);
        assert!(matches!(result, Err(CohortError::Duplicate(id)) if id == "a"));
    }

    #[test]
    fn test_missing_field_fails_deserialization() {
        let json = r#"{
            "id": "c1", "name": "x", "segment": "industrial", "num_accounts": 10,
            "flex_kw_per_account": 50.0, "notice_time_minutes_required": 120,
            "weather_sensitivity": "none", "peak_hours": [], "comfort_limit_f": 0.0
        }"#;
        let parsed: Result<Cohort, _> = serde_json::from_str(json);
        assert!(parsed.is_err(), "missing baseline_acceptance_rate must be rejected");
    }
}
