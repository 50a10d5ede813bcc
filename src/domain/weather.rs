use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Provenance;

/// Current weather for a region, as resolved by a weather provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub region: String,
    pub observed_at: DateTime<Utc>,
    pub temperature_f: f64,
    pub humidity_pct: f64,
    pub conditions: String,
    pub provenance: Provenance,
}

impl WeatherSnapshot {
    pub fn temperature_c(&self) -> f64 {
        (self.temperature_f - 32.0) * 5.0 / 9.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_conversion() {
        let w = WeatherSnapshot {
            region: "austin".to_string(),
            observed_at: Utc::now(),
            temperature_f: 212.0,
            humidity_pct: 40.0,
            conditions: "Clear".to_string(),
            provenance: Provenance::Synthetic,
        };
        assert!((w.temperature_c() - 100.0).abs() < 1e-9);
    }
}
