//! Core domain types and logic.

pub mod error;
pub mod frequency;
pub mod universe;
pub mod position;
pub mod constraints;
pub mod preprocess;
pub mod signal;
pub mod alpha;
pub mod optimizer;
pub mod execution;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
