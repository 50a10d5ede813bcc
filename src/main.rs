use anyhow::{Context, Result};
use dr_planner::{api, app, clock::SystemClock, config::Config, telemetry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cfg = Config::load().context("Failed to load configuration")?;
    let clock = Arc::new(SystemClock);

    let collaborators = app::Collaborators::from_config(&cfg, clock.clone()).await?;
    let (state, sweeper) = app::AppState::build(&cfg, clock, collaborators).await?;
    let lifecycle = state.lifecycle.clone();

    let cancel = CancellationToken::new();
    let tasks = app::spawn_background_tasks(sweeper, cancel.clone());

    let router = api::router(state, &cfg);
    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0 - reachable from the network");
    }
    info!(%addr, "starting DR planner");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    lifecycle.settle_all().await;

    info!("shutdown complete");
    Ok(())
}
