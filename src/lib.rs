pub mod analysis;
pub mod commands;
pub mod config;
pub mod context;
pub mod errors;
pub mod feature_schema;
pub mod features;
pub mod forecaster;
pub mod history;
pub mod indicators;
pub mod lstm;
pub mod models;
pub mod scaler;
pub mod series_store;
pub mod service;
pub mod service_status;
pub mod windowing;
