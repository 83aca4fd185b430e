//! Custom Resource Definitions for the telemetry operator
//!
//! Pipeline resources users author to route logs, metrics and traces to OTLP backends.

mod log_pipeline;
mod metric_pipeline;
mod trace_pipeline;
mod types;

pub use log_pipeline::{
    LogOtlpInput, LogPipeline, LogPipelineInput, LogPipelineOutput, LogPipelineSpec,
};
pub use metric_pipeline::{
    IstioInput, MetricInputSource, MetricPipeline, MetricPipelineInput, MetricPipelineOutput,
    MetricPipelineSpec, OtlpInput, PrometheusInput, ResourceToggle, RuntimeInput,
    RuntimeResource, RuntimeResources, Toggle,
};
pub use trace_pipeline::{TracePipeline, TracePipelineOutput, TracePipelineSpec};
pub use types::*;
