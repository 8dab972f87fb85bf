//! Random forest training for cardiovascular-disease risk.
/// Optional TOML configuration.
pub mod config;
/// Tabular datasets: CSV loading and stratified splitting.
pub mod dataset;
/// Logging setup for training runs.
pub mod logging;
/// Forest learner, metrics and model files.
pub mod ml;
/// End-to-end training run.
pub mod pipeline;
/// Project-root relative paths.
pub mod project;
