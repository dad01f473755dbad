mod app;
mod classifier;
mod labels;
mod ort_service;
mod prediction;
mod preprocess;
mod routes;
mod server;
mod telemetry;

pub mod config;

pub use app::{start_app, StartupError};
