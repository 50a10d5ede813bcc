pub mod cohorts;
pub mod error;
pub mod grid;
pub mod health;
pub mod history;
pub mod plans;
pub mod response;
pub mod signals;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{app::AppState, config::Config};

pub fn router(state: AppState, cfg: &Config) -> Router {
    let mut router = Router::new()
        .nest("/api/v1", v1_router())
        .route("/healthz", get(health::health_check))
        .with_state(state);

    if cfg.server.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:3000"))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        router = router.layer(cors);
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024))
                .layer(TimeoutLayer::new(Duration::from_secs(cfg.server.request_timeout_secs))),
        )
        .layer(TraceLayer::new_for_http())
}

fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/plans", post(plans::propose_plan).get(plans::list_plans))
        .route("/plans/:id", get(plans::get_plan))
        .route("/plans/:id/approve", post(plans::approve_plan))
        .route("/plans/:id/reject", post(plans::reject_plan))
        .route("/plans/:id/audit", get(plans::plan_audit))
        .route("/cohorts", get(cohorts::list_cohorts))
        .route("/cohorts/summary", get(cohorts::cohort_summary))
        .route("/cohorts/:id", get(cohorts::get_cohort))
        .route("/cohorts/:id/flexibility", get(cohorts::cohort_flexibility))
        .route("/signals", get(signals::list_signals))
        .route("/history", get(history::list_history))
        .route("/history/summary", get(history::history_summary))
        .route("/grid/stress", get(grid::get_grid_stress))
}
