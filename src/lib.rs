pub mod api;
pub mod config;
pub mod ml;
pub mod telemetry;
