//! Realized-response estimates for allocations.

use chrono::{DateTime, Utc};

use crate::config::ResponseConfig;
use crate::domain::{Cohort, WeatherSensitivity, WeatherSnapshot};

pub struct ResponsePredictor {
    cfg: ResponseConfig,
}

impl ResponsePredictor {
    pub fn new(cfg: ResponseConfig) -> Self {
        Self { cfg }
    }

    /// Probability that the cohort follows the event, in [0, 1].
    pub fn acceptance_probability(
        &self,
        cohort: &Cohort,
        weather: &WeatherSnapshot,
        now: DateTime<Utc>,
        window_start: DateTime<Utc>,
    ) -> f64 {
        let base = cohort.baseline_acceptance_rate.clamp(0.0, 1.0);
        let weathered = self.weather_adjusted(base, cohort.weather_sensitivity, weather.temperature_f);

        let lead_minutes = (window_start - now).num_minutes().max(0) as f64;
        let probability = weathered * self.notice_factor(cohort.notice_time_minutes_required, lead_minutes);

        probability.clamp(0.0, 1.0)
    }

    fn weather_adjusted(&self, base: f64, sensitivity: WeatherSensitivity, temperature_f: f64) -> f64 {
        let penalty = match sensitivity {
            WeatherSensitivity::None => return base,
            WeatherSensitivity::Heat => {
                (temperature_f - self.cfg.heat_threshold_f).max(0.0) * self.cfg.heat_decay_per_f
            }
            WeatherSensitivity::Cold => {
                (self.cfg.cold_threshold_f - temperature_f).max(0.0) * self.cfg.cold_decay_per_f
            }
        };
        if penalty <= 0.0 {
            return base;
        }
        // The floor never lifts a cohort above its own baseline.
        (base - penalty).max(self.cfg.min_probability.min(base))
    }

    fn notice_factor(&self, required_minutes: u32, lead_minutes: f64) -> f64 {
        if required_minutes == 0 {
            return 1.0;
        }
        let required = f64::from(required_minutes);
        if lead_minutes >= required {
            return 1.0;
        }
        let floor = self.cfg.notice_floor.clamp(0.0, 1.0);
        floor + (1.0 - floor) * lead_minutes / required
    }
}

/// Plan confidence: harmonic mean of probabilities weighted by target MW.
///
/// Returns 0 for an empty plan or when any weighted allocation has zero
/// probability.
pub fn plan_confidence<I>(weighted: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut total_weight = 0.0;
    let mut inverse_sum = 0.0;
    for (weight, probability) in weighted {
        if weight <= 0.0 {
            continue;
        }
        if probability <= 0.0 {
            return 0.0;
        }
        total_weight += weight;
        inverse_sum += weight / probability;
    }
    if total_weight <= 0.0 || inverse_sum <= 0.0 {
        return 0.0;
    }
    (total_weight / inverse_sum).clamp(0.0, 1.0)
}
