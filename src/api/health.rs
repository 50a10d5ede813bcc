use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::AppState;
use crate::lifecycle::sweeper::TaskStatus;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: DateTime<Utc>,
    version: &'static str,
    uptime_secs: i64,
    checks: HealthChecks,
}

/// Individual health checks
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    sweeper: ComponentHealth,
}

/// Health status of a component
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentHealth {
    fn from_task(status: &TaskStatus) -> Self {
        let failing = match (&status.last_error, status.last_run, status.last_success) {
            (Some(_), Some(run), Some(ok)) => run > ok,
            (Some(_), Some(_), None) => true,
            _ => false,
        };
        Self {
            status: if failing { "unhealthy" } else { "healthy" }.to_string(),
            last_run: status.last_run,
            error: if failing { status.last_error.clone() } else { None },
        }
    }
}

/// GET /healthz - Liveness plus background task status
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let sweeper = ComponentHealth::from_task(&*state.sweeper_status.read().await);
    let healthy = sweeper.status == "healthy";
    let now = Utc::now();

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: now,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (now - state.started_at).num_seconds(),
        checks: HealthChecks { sweeper },
    };

    (StatusCode::OK, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_health_from_task() {
        let t = Utc::now();
        let mut status = TaskStatus::default();
        assert_eq!(ComponentHealth::from_task(&status).status, "healthy");

        status.last_run = Some(t);
        status.last_error = Some("disk full".into());
        let health = ComponentHealth::from_task(&status);
        assert_eq!(health.status, "unhealthy");
        assert_eq!(health.error.as_deref(), Some("disk full"));

        status.last_success = Some(t);
        assert_eq!(ComponentHealth::from_task(&status).status, "healthy");
    }
}
