//! Collaborators the planning core consumes: grid telemetry, weather and the
//! cohort catalog, plus the read-through caches that put timeouts and
//! staleness bounds around them.

pub mod cache;
pub mod cohort_file;
#[cfg(feature = "sim")]
pub mod simulated;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use cache::{CacheSource, ReadThroughCache, Resolved};
pub use cohort_file::CohortCatalog;

use crate::clock::Clock;
use crate::config::ProvidersConfig;
use crate::domain::{Cohort, ForecastSeries, GridSnapshot, PlanningError, WeatherSnapshot};

#[async_trait]
pub trait GridSnapshotProvider: Send + Sync {
    async fn current_snapshot(&self) -> Result<GridSnapshot>;
    async fn forecast(&self, hours: usize) -> Result<ForecastSeries>;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn weather(&self, region: &str) -> Result<WeatherSnapshot>;
}

#[async_trait]
pub trait CohortRegistry: Send + Sync {
    async fn list_cohorts(&self) -> Result<Vec<Cohort>>;
}

/// Provider set as seen by the planner: every read goes through a cache with a
/// timeout and fails with `DataUnavailable` rather than hanging.
pub struct Providers {
    grid: Arc<dyn GridSnapshotProvider>,
    weather: Arc<dyn WeatherProvider>,
    cohorts: Arc<dyn CohortRegistry>,
    snapshot_cache: ReadThroughCache<GridSnapshot>,
    forecast_cache: ReadThroughCache<ForecastSeries>,
    weather_cache: ReadThroughCache<WeatherSnapshot>,
    cfg: ProvidersConfig,
}

impl Providers {
    pub fn new(
        grid: Arc<dyn GridSnapshotProvider>,
        weather: Arc<dyn WeatherProvider>,
        cohorts: Arc<dyn CohortRegistry>,
        clock: Arc<dyn Clock>,
        cfg: ProvidersConfig,
    ) -> Self {
        let timeout = cfg.timeout();
        Self {
            snapshot_cache: ReadThroughCache::new(
                "grid_snapshot",
                cfg.snapshot_ttl_secs,
                cfg.snapshot_max_stale_secs,
                timeout,
                clock.clone(),
            ),
            forecast_cache: ReadThroughCache::new(
                "load_forecast",
                cfg.forecast_ttl_secs,
                cfg.forecast_max_stale_secs,
                timeout,
                clock.clone(),
            ),
            weather_cache: ReadThroughCache::new(
                "weather",
                cfg.weather_ttl_secs,
                cfg.weather_max_stale_secs,
                timeout,
                clock,
            ),
            grid,
            weather,
            cohorts,
            cfg,
        }
    }

    pub fn region(&self) -> &str {
        &self.cfg.region
    }

    pub async fn snapshot(&self) -> Result<Resolved<GridSnapshot>, PlanningError> {
        let grid = self.grid.clone();
        let resolved = self
            .snapshot_cache
            .get_or_fetch("current", || async move { grid.current_snapshot().await })
            .await?;
        resolved.value.validate()?;
        Ok(resolved)
    }

    pub async fn forecast(&self) -> Result<Resolved<ForecastSeries>, PlanningError> {
        let hours = self.cfg.forecast_hours;
        let grid = self.grid.clone();
        let resolved = self
            .forecast_cache
            .get_or_fetch(&format!("{hours}h"), || async move { grid.forecast(hours).await })
            .await?;
        resolved.value.validate(hours)?;
        Ok(resolved)
    }

    pub async fn weather(&self, region: &str) -> Result<Resolved<WeatherSnapshot>, PlanningError> {
        let weather = self.weather.clone();
        let key = region.to_string();
        self.weather_cache
            .get_or_fetch(region, || async move { weather.weather(&key).await })
            .await
    }

    pub async fn cohorts(&self) -> Result<Vec<Cohort>, PlanningError> {
        match tokio::time::timeout(self.cfg.timeout(), self.cohorts.list_cohorts()).await {
            Ok(Ok(cohorts)) => Ok(cohorts),
            Ok(Err(e)) => Err(PlanningError::DataUnavailable(format!(
                "cohort registry: {e:#}"
            ))),
            Err(_) => Err(PlanningError::DataUnavailable(
                "cohort registry: timed out".to_string(),
            )),
        }
    }
}
