//! Seeded synthetic providers for demos and local runs.
//!
//! Values are ERCOT-scale and follow a diurnal shape with Gaussian noise. All
//! output is tagged [`Provenance::Synthetic`]; the planner never fabricates
//! data itself.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{GridSnapshotProvider, WeatherProvider};
use crate::clock::Clock;
use crate::domain::{
    Cohort, ForecastSeries, GridSnapshot, Provenance, Segment, WeatherSensitivity, WeatherSnapshot,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedGridConfig {
    pub base_load_mw: f64,
    /// Extra load at the daily peak relative to base.
    pub peak_swing_mw: f64,
    pub peak_hour: f64,
    pub capacity_mw: f64,
    pub base_price_per_mwh: f64,
    pub load_noise_std_mw: f64,
    pub price_noise_std: f64,
    pub renewable_mw: f64,
}

impl Default for SimulatedGridConfig {
    fn default() -> Self {
        Self {
            base_load_mw: 52_000.0,
            peak_swing_mw: 20_000.0,
            peak_hour: 17.0,
            capacity_mw: 82_000.0,
            base_price_per_mwh: 40.0,
            load_noise_std_mw: 600.0,
            price_noise_std: 4.0,
            renewable_mw: 24_000.0,
        }
    }
}

pub struct SimulatedGrid {
    config: SimulatedGridConfig,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

impl SimulatedGrid {
    pub fn new(config: SimulatedGridConfig, clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self {
            config,
            clock,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Deterministic diurnal load for a fractional hour of day.
    fn expected_load(&self, hour: f64) -> f64 {
        let distance = (hour - self.config.peak_hour).abs().min(24.0 - (hour - self.config.peak_hour).abs());
        let shape = (-(distance * distance) / (2.0 * 3.5 * 3.5)).exp();
        self.config.base_load_mw + self.config.peak_swing_mw * shape
    }

    fn noise(&self, std_dev: f64) -> f64 {
        match Normal::new(0.0, std_dev) {
            Ok(normal) => normal.sample(&mut *self.rng.lock()),
            Err(_) => 0.0,
        }
    }

    fn price_for(&self, load_mw: f64) -> f64 {
        let utilization = load_mw / self.config.capacity_mw;
        let scarcity = (utilization - 0.75).max(0.0) * 12.0;
        (self.config.base_price_per_mwh * (1.0 + scarcity) + self.noise(self.config.price_noise_std))
            .max(0.0)
    }

    fn snapshot_at(&self, at: DateTime<Utc>) -> GridSnapshot {
        let hour = at.hour() as f64 + at.minute() as f64 / 60.0;
        let system_load_mw = (self.expected_load(hour) + self.noise(self.config.load_noise_std_mw))
            .clamp(0.0, self.config.capacity_mw);
        let daylight = ((hour - 6.0) / 14.0 * std::f64::consts::PI).sin().max(0.0);
        GridSnapshot {
            timestamp: at,
            system_load_mw,
            capacity_mw: self.config.capacity_mw,
            reserves_mw: self.config.capacity_mw - system_load_mw,
            price_per_mwh: self.price_for(system_load_mw),
            renewable_output_mw: self.config.renewable_mw * (0.4 + 0.6 * daylight),
            provenance: Provenance::Synthetic,
        }
    }
}

#[async_trait]
impl GridSnapshotProvider for SimulatedGrid {
    async fn current_snapshot(&self) -> Result<GridSnapshot> {
        Ok(self.snapshot_at(self.clock.now()))
    }

    async fn forecast(&self, hours: usize) -> Result<ForecastSeries> {
        let now = self.clock.now();
        let load_mw = (0..hours)
            .map(|h| {
                let hour = ((now.hour() as usize + h) % 24) as f64;
                (self.expected_load(hour) + self.noise(self.config.load_noise_std_mw)).max(0.0)
            })
            .collect();
        Ok(ForecastSeries::from_hourly(now, load_mw))
    }
}

pub struct SimulatedWeather {
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

impl SimulatedWeather {
    pub fn new(clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self {
            clock,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn regional_base_f(region: &str) -> f64 {
        match region.to_lowercase().as_str() {
            "houston" => 92.0,
            "dallas" => 94.0,
            "el_paso" => 96.0,
            "amarillo" => 86.0,
            _ => 90.0,
        }
    }
}

#[async_trait]
impl WeatherProvider for SimulatedWeather {
    async fn weather(&self, region: &str) -> Result<WeatherSnapshot> {
        let now = self.clock.now();
        let hour = now.hour() as f64;
        let diurnal = ((hour - 9.0) / 24.0 * 2.0 * std::f64::consts::PI).sin() * 8.0;
        let noise = Normal::new(0.0, 1.5)?.sample(&mut *self.rng.lock());
        let temperature_f = Self::regional_base_f(region) + diurnal + noise;
        let humidity_pct = (70.0 - (temperature_f - 80.0) * 1.2).clamp(15.0, 95.0);
        let conditions = if temperature_f >= 100.0 {
            "Extreme Heat"
        } else if temperature_f >= 90.0 {
            "Hot"
        } else if temperature_f <= 32.0 {
            "Freezing"
        } else {
            "Clear"
        };

        Ok(WeatherSnapshot {
            region: region.to_string(),
            observed_at: now,
            temperature_f,
            humidity_pct,
            conditions: conditions.to_string(),
            provenance: Provenance::Synthetic,
        })
    }
}

/// Built-in catalog used when no cohort file is configured.
pub fn demo_cohorts() -> Vec<Cohort> {
    let cohort = |id: &str,
                  name: &str,
                  segment: Segment,
                  num_accounts: u32,
                  flex_kw_per_account: f64,
                  baseline_acceptance_rate: f64,
                  notice_time_minutes_required: u32,
                  weather_sensitivity: WeatherSensitivity,
                  peak_hours: Vec<u8>,
                  comfort_limit_f: f64| Cohort {
        id: id.to_string(),
        name: name.to_string(),
        segment,
        num_accounts,
        flex_kw_per_account,
        baseline_acceptance_rate,
        notice_time_minutes_required,
        weather_sensitivity,
        peak_hours,
        comfort_limit_f,
    };

    vec![
        cohort("res_ev_austin", "Austin EV Owners", Segment::ResidentialEv, 12_000, 3.3, 0.72, 60, WeatherSensitivity::None, vec![18, 19, 20, 21], 0.0),
        cohort("res_solar_hill", "Hill Country Solar + Storage", Segment::ResidentialSolar, 5_500, 4.0, 0.65, 120, WeatherSensitivity::None, vec![16, 17, 18, 19], 0.0),
        cohort("res_std_smart_tstat", "Smart Thermostat Households", Segment::ResidentialStandard, 30_000, 1.2, 0.58, 30, WeatherSensitivity::Heat, vec![15, 16, 17, 18, 19], 2.0),
        cohort("com_hvac_downtown", "Downtown Offices HVAC", Segment::CommercialHvac, 450, 60.0, 0.84, 120, WeatherSensitivity::Heat, vec![13, 14, 15, 16, 17], 3.0),
        cohort("com_lighting_retail", "Retail Lighting", Segment::CommercialLighting, 800, 18.0, 0.78, 60, WeatherSensitivity::None, vec![17, 18, 19, 20], 0.0),
        cohort("ind_process_gulf", "Gulf Coast Process Loads", Segment::Industrial, 35, 1_500.0, 0.9, 240, WeatherSensitivity::None, vec![12, 13, 14, 15, 16, 17], 0.0),
        cohort("res_heat_pump_panhandle", "Panhandle Heat Pumps", Segment::ResidentialStandard, 9_000, 1.5, 0.6, 60, WeatherSensitivity::Cold, vec![6, 7, 8, 18, 19], 2.0),
    ]
}
