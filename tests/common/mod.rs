//! Shared fixtures for integration tests: static providers, a manual clock
//! and a fully wired application over an in-memory store.

#![allow(dead_code)]

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dr_planner::app::{AppState, Collaborators};
use dr_planner::clock::{Clock, ManualClock};
use dr_planner::config::Config;
use dr_planner::dispatch::{LoggingDispatcher, SignalDispatcher};
use dr_planner::domain::{
    Cohort, ForecastSeries, GridSnapshot, Provenance, Segment, WeatherSensitivity, WeatherSnapshot,
};
use dr_planner::lifecycle::{InMemoryPlanStore, LifecycleSweeper};
use dr_planner::planner::ProposeRequest;
use dr_planner::domain::Strategy;
use dr_planner::providers::{CohortCatalog, GridSnapshotProvider, WeatherProvider};

/// Monday 2024-07-15 12:00 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap()
}

/// Grid feed returning a fixed snapshot stamped with the clock's current time.
pub struct StaticGrid {
    clock: Arc<ManualClock>,
    snapshot: Mutex<GridSnapshot>,
    failing: AtomicBool,
}

impl StaticGrid {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            snapshot: Mutex::new(GridSnapshot {
                timestamp: t0(),
                system_load_mw: 60_000.0,
                capacity_mw: 70_000.0,
                reserves_mw: 10_000.0,
                price_per_mwh: 60.0,
                renewable_output_mw: 15_000.0,
                provenance: Provenance::Live,
            }),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl GridSnapshotProvider for StaticGrid {
    async fn current_snapshot(&self) -> anyhow::Result<GridSnapshot> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("grid feed offline");
        }
        let mut snapshot = self.snapshot.lock().clone();
        snapshot.timestamp = self.clock.now();
        Ok(snapshot)
    }

    async fn forecast(&self, hours: usize) -> anyhow::Result<ForecastSeries> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("grid feed offline");
        }
        let start = self.clock.now();
        // peak five hours after the clock's current hour
        let load = (0..hours)
            .map(|h| if h == 5 { 68_000.0 } else { 60_000.0 })
            .collect();
        Ok(ForecastSeries::from_hourly(start, load))
    }
}

pub struct StaticWeather {
    pub temperature_f: f64,
}

#[async_trait]
impl WeatherProvider for StaticWeather {
    async fn weather(&self, region: &str) -> anyhow::Result<WeatherSnapshot> {
        Ok(WeatherSnapshot {
            region: region.to_string(),
            observed_at: t0(),
            temperature_f: self.temperature_f,
            humidity_pct: 35.0,
            conditions: "Clear".to_string(),
            provenance: Provenance::Cached,
        })
    }
}

/// A cohort with no notice requirement and no weather sensitivity.
/// `capacity_mw` is spread over 1,000 accounts.
pub fn cohort(id: &str, capacity_mw: f64, acceptance: f64) -> Cohort {
    Cohort {
        id: id.to_string(),
        name: format!("Cohort {id}"),
        segment: Segment::CommercialHvac,
        num_accounts: 1_000,
        flex_kw_per_account: capacity_mw,
        baseline_acceptance_rate: acceptance,
        notice_time_minutes_required: 0,
        weather_sensitivity: WeatherSensitivity::None,
        peak_hours: vec![16, 17, 18],
        comfort_limit_f: 3.0,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub sweeper: LifecycleSweeper,
    pub clock: Arc<ManualClock>,
    pub grid: Arc<StaticGrid>,
    pub config: Config,
}

impl TestApp {
    pub async fn new(cohorts: Vec<Cohort>) -> Self {
        Self::with_dispatcher(cohorts, Arc::new(LoggingDispatcher)).await
    }

    pub async fn with_dispatcher(cohorts: Vec<Cohort>, dispatcher: Arc<dyn SignalDispatcher>) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let grid = Arc::new(StaticGrid::new(clock.clone()));
        let mut config = Config::default();
        config.lifecycle.store_dir = None;
        config.cohorts.path = None;

        let collaborators = Collaborators {
            grid: grid.clone(),
            weather: Arc::new(StaticWeather { temperature_f: 88.0 }),
            cohorts: Arc::new(CohortCatalog::new(cohorts).expect("valid test catalog")),
            store: Arc::new(InMemoryPlanStore::new()),
            dispatcher,
        };
        let (state, sweeper) = AppState::build(&config, clock.clone(), collaborators)
            .await
            .expect("app state");

        Self {
            state,
            sweeper,
            clock,
            grid,
            config,
        }
    }
}

/// Request for a window `start_h` to `end_h` hours after `t0`.
pub fn window(start_h: i64, end_h: i64, strategy: Strategy) -> ProposeRequest {
    ProposeRequest {
        window_start: t0() + Duration::hours(start_h),
        window_end: t0() + Duration::hours(end_h),
        strategy,
        cohort_ids: None,
        target_mw: None,
    }
}
