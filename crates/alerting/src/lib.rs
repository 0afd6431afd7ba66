//! Alerting System
//!
//! Turns drowsiness state notifications into status labels and severities,
//! and keeps per-state alert history.

mod manager;

pub use manager::{AlertConfig, AlertState, Severity, StatusBoard};
