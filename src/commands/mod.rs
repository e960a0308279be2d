pub mod alerts;
pub mod batch;
pub mod export_training_pairs;
pub mod forecast;
pub mod health;
pub mod quality;
pub mod stats;
