pub mod apis;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod metrics;
pub mod pipeline;
pub mod query;
pub mod types;

// Ports and their adapters
pub mod app;
pub mod infra;
