//! School evaluation and grade aggregation engine with its configuration and telemetry.

pub mod config;
pub mod error;
pub mod grading;
pub mod telemetry;
