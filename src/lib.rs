//! Faultline - commit defect-risk models with per-dimension attribution
//!
//! This library trains a random-forest classifier on repository commit
//! metrics, exports it as a portable model, and decomposes each commit's
//! predicted risk into contributions of feature dimensions (experience,
//! history, size, diffusion) relative to a median baseline commit.

pub mod attribution;
pub mod cli;
pub mod collector;
pub mod config;
pub mod csv_output;
pub mod dataset;
pub mod evaluation;
pub mod forest;
pub mod inference;
pub mod metrics_table;
pub mod output;
pub mod persistence;
pub mod pipeline;
pub mod schema;
pub mod stats;
pub mod status;
pub mod trainer;
