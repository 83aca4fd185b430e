//! Telemetry Operator
//!
//! Builds OpenTelemetry Collector gateway configurations from `LogPipeline`,
//! `MetricPipeline` and `TracePipeline` resources.

pub mod collector;
pub mod crd;
pub mod error;

pub use error::{Error, Result};
