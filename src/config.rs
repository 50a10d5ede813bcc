use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub cohorts: CohortsConfig,
    pub stress: StressConfig,
    pub allocation: AllocationConfig,
    pub response: ResponseConfig,
    pub lifecycle: LifecycleConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            enable_cors: false,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Provider call timeouts and read-through cache windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub timeout_ms: u64,
    pub snapshot_ttl_secs: u64,
    pub snapshot_max_stale_secs: u64,
    pub forecast_ttl_secs: u64,
    pub forecast_max_stale_secs: u64,
    pub weather_ttl_secs: u64,
    pub weather_max_stale_secs: u64,
    pub forecast_hours: usize,
    pub region: String,
    /// Seed for the simulated providers.
    pub seed: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            snapshot_ttl_secs: 60,
            snapshot_max_stale_secs: 300,
            forecast_ttl_secs: 900,
            forecast_max_stale_secs: 3_600,
            weather_ttl_secs: 600,
            weather_max_stale_secs: 1_800,
            forecast_hours: 24,
            region: "austin".to_string(),
            seed: 42,
        }
    }
}

impl ProvidersConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortsConfig {
    /// JSON cohort catalog. When absent the built-in demo catalog is used.
    pub path: Option<PathBuf>,
}

impl Default for CohortsConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("config/cohorts.json")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Price considered "normal"; ratios above 1 add stress.
    pub baseline_price_per_mwh: f64,
    /// Reserve margin (percent of capacity) at which reserve stress reaches zero.
    pub target_margin_pct: f64,
    pub reserve_weight: f64,
    pub price_weight: f64,
    pub moderate_threshold: f64,
    pub high_threshold: f64,
    pub critical_threshold: f64,
    pub max_relief_mw: f64,
    pub min_target_mw: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            baseline_price_per_mwh: 50.0,
            target_margin_pct: 15.0,
            reserve_weight: 0.7,
            price_weight: 0.3,
            moderate_threshold: 0.25,
            high_threshold: 0.5,
            critical_threshold: 0.75,
            max_relief_mw: 150.0,
            min_target_mw: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Dispatches allowed per cohort in any rolling 7 days.
    pub max_events_per_week: u32,
    pub balanced_acceptance_weight: f64,
    pub balanced_capacity_weight: f64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_events_per_week: 3,
            balanced_acceptance_weight: 0.5,
            balanced_capacity_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    pub heat_threshold_f: f64,
    pub heat_decay_per_f: f64,
    pub cold_threshold_f: f64,
    pub cold_decay_per_f: f64,
    /// Lowest acceptance the weather adjustment can produce.
    pub min_probability: f64,
    /// Notice factor when the event starts immediately.
    pub notice_floor: f64,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            heat_threshold_f: 95.0,
            heat_decay_per_f: 0.01,
            cold_threshold_f: 20.0,
            cold_decay_per_f: 0.01,
            min_probability: 0.05,
            notice_floor: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Max snapshot age at approval time.
    pub freshness_window_secs: i64,
    pub sweep_interval_secs: u64,
    /// Directory for the JSON-lines plan store. In-memory when absent.
    pub store_dir: Option<PathBuf>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: 300,
            sweep_interval_secs: 30,
            store_dir: Some(PathBuf::from("data/plans")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub attempt_timeout_ms: u64,
    /// Fraction of attempts the simulated dispatcher fails.
    pub simulated_failure_rate: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            attempt_timeout_ms: 5_000,
            simulated_failure_rate: 0.0,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("DRP__").split("__"));
        Ok(figment.extract()?)
    }
}
