//! Collector configuration builder
//!
//! Translates telemetry pipeline resources into OpenTelemetry Collector
//! configuration documents. Sensitive values are surfaced as environment
//! bindings and never appear in the document.

pub mod components;
pub mod config;
pub mod env;
pub mod fragment;
pub mod ids;
pub mod merge;
pub mod ottl;
pub mod secrets;

mod gateway;
mod log_gateway;
mod metric_gateway;
mod options;
mod otlp_exporter;
mod trace_gateway;

pub use config::Config;
pub use env::{EnvBinding, EnvBindings, FieldPath, SecretValue, ValueSource};
pub use gateway::BuildOutput;
pub use ids::{ServicePipelineId, Signal, StaticId};
pub use log_gateway::LogGatewayBuilder;
pub use metric_gateway::MetricGatewayBuilder;
pub use options::{BuildOptions, ClusterInfo, Enrichments, PodLabel};
pub use secrets::{KubeSecretResolver, ResolveError, SecretResolver, StaticSecretResolver};
pub use trace_gateway::TraceGatewayBuilder;
