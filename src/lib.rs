pub mod api;
pub mod app;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod lifecycle;
pub mod planner;
pub mod providers;
pub mod telemetry;
