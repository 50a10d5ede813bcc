//! Wiring: builds the provider set, plan store, dispatcher, lifecycle and
//! engine from configuration and shares them with the HTTP layer.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::dispatch::{LoggingDispatcher, RetryPolicy, SignalDispatcher, SimulatedDispatcher};
use crate::lifecycle::sweeper::TaskStatus;
use crate::lifecycle::{InMemoryPlanStore, JsonlPlanStore, LifecycleSweeper, PlanLifecycle, PlanStore};
use crate::planner::PlanningEngine;
use crate::providers::{CohortCatalog, CohortRegistry, GridSnapshotProvider, Providers, WeatherProvider};

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PlanningEngine>,
    pub lifecycle: Arc<PlanLifecycle>,
    pub providers: Arc<Providers>,
    pub sweeper_status: Arc<RwLock<TaskStatus>>,
    pub started_at: DateTime<Utc>,
}

/// External collaborators the planner is built around.
pub struct Collaborators {
    pub grid: Arc<dyn GridSnapshotProvider>,
    pub weather: Arc<dyn WeatherProvider>,
    pub cohorts: Arc<dyn CohortRegistry>,
    pub store: Arc<dyn PlanStore>,
    pub dispatcher: Arc<dyn SignalDispatcher>,
}

impl Collaborators {
    /// Collaborators described by the configuration.
    pub async fn from_config(cfg: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let cohorts = load_cohorts(cfg)?;
        let (grid, weather) = grid_and_weather(cfg, clock)?;

        let store: Arc<dyn PlanStore> = match &cfg.lifecycle.store_dir {
            Some(dir) => Arc::new(
                JsonlPlanStore::open(dir.clone())
                    .await
                    .with_context(|| format!("Failed to open plan store at {}", dir.display()))?,
            ),
            None => {
                warn!("no plan store directory configured, plans will not survive restart");
                Arc::new(InMemoryPlanStore::new())
            }
        };

        let dispatcher: Arc<dyn SignalDispatcher> = if cfg.dispatch.simulated_failure_rate > 0.0 {
            Arc::new(SimulatedDispatcher::new(
                cfg.dispatch.simulated_failure_rate,
                cfg.providers.seed,
            ))
        } else {
            Arc::new(LoggingDispatcher)
        };

        Ok(Self {
            grid,
            weather,
            cohorts,
            store,
            dispatcher,
        })
    }
}

impl AppState {
    /// Build state and the sweeper that keeps plan windows moving.
    pub async fn build(
        cfg: &Config,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
    ) -> Result<(Self, LifecycleSweeper)> {
        let providers = Arc::new(Providers::new(
            collaborators.grid,
            collaborators.weather,
            collaborators.cohorts,
            clock.clone(),
            cfg.providers.clone(),
        ));

        let lifecycle = Arc::new(
            PlanLifecycle::open(
                collaborators.store,
                collaborators.dispatcher,
                RetryPolicy::from_config(&cfg.dispatch),
                clock.clone(),
                cfg.lifecycle.clone(),
            )
            .await
            .context("Failed to restore plan lifecycle")?,
        );

        let engine = Arc::new(PlanningEngine::new(
            providers.clone(),
            lifecycle.clone(),
            clock.clone(),
            cfg,
        ));

        let sweeper = LifecycleSweeper::new(
            lifecycle.clone(),
            clock.clone(),
            cfg.lifecycle.sweep_interval_secs,
        );

        let state = Self {
            engine,
            lifecycle,
            providers,
            sweeper_status: sweeper.status_handle(),
            started_at: clock.now(),
        };
        Ok((state, sweeper))
    }
}

/// Start background tasks; they stop when `cancel` fires.
pub fn spawn_background_tasks(sweeper: LifecycleSweeper, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
    let handle = tokio::spawn(sweeper.run(cancel));
    info!("background tasks started");
    vec![handle]
}

fn load_cohorts(cfg: &Config) -> Result<Arc<dyn CohortRegistry>> {
    if let Some(path) = &cfg.cohorts.path {
        if path.exists() {
            let catalog = CohortCatalog::from_json_file(path)
                .with_context(|| format!("Invalid cohort catalog {}", path.display()))?;
            return Ok(Arc::new(catalog));
        }
        warn!(path = %path.display(), "cohort catalog not found");
    }

    #[cfg(feature = "sim")]
    {
        warn!("using built-in demo cohorts");
        let catalog = CohortCatalog::new(crate::providers::simulated::demo_cohorts())?;
        Ok(Arc::new(catalog))
    }

    #[cfg(not(feature = "sim"))]
    {
        anyhow::bail!("no cohort catalog configured (set cohorts.path)")
    }
}

#[cfg(feature = "sim")]
fn grid_and_weather(
    cfg: &Config,
    clock: Arc<dyn Clock>,
) -> Result<(Arc<dyn GridSnapshotProvider>, Arc<dyn WeatherProvider>)> {
    use crate::providers::simulated::{SimulatedGrid, SimulatedGridConfig, SimulatedWeather};

    info!(seed = cfg.providers.seed, "using simulated grid and weather providers");
    let grid = SimulatedGrid::new(SimulatedGridConfig::default(), clock.clone(), cfg.providers.seed);
    let weather = SimulatedWeather::new(clock, cfg.providers.seed.wrapping_add(1));
    Ok((Arc::new(grid), Arc::new(weather)))
}

#[cfg(not(feature = "sim"))]
fn grid_and_weather(
    _cfg: &Config,
    _clock: Arc<dyn Clock>,
) -> Result<(Arc<dyn GridSnapshotProvider>, Arc<dyn WeatherProvider>)> {
    anyhow::bail!("no grid or weather provider compiled in; enable the `sim` feature")
}
