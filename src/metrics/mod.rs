//! Prometheus metrics for the klaudio operator
//!
//! This module exposes metrics for monitoring operator health and performance.

mod prometheus;

pub use prometheus::*;
