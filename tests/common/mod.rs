//! Shared fixtures for the gateway integration tests

#![allow(dead_code)]

use std::sync::Arc;

use telemetry_operator::collector::{SecretResolver, StaticSecretResolver};
use telemetry_operator::crd::{
    LogPipeline, LogPipelineOutput, LogPipelineSpec, MetricPipeline, MetricPipelineInput,
    MetricPipelineOutput, MetricPipelineSpec, OtlpOutput, SecretKeyRef, TracePipeline,
    TracePipelineOutput, TracePipelineSpec, ValueType,
};

/// Surfaces builder logs with `RUST_LOG=debug cargo test -- --nocapture`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn otlp(endpoint: &str) -> OtlpOutput {
    OtlpOutput {
        endpoint: ValueType::inline(endpoint),
        ..Default::default()
    }
}

pub fn metric_pipeline(name: &str, input: MetricPipelineInput) -> MetricPipeline {
    metric_pipeline_to(name, input, otlp("http://b:4317"))
}

pub fn metric_pipeline_to(
    name: &str,
    input: MetricPipelineInput,
    output: OtlpOutput,
) -> MetricPipeline {
    MetricPipeline::new(
        name,
        MetricPipelineSpec {
            input,
            output: MetricPipelineOutput { otlp: output },
            ..Default::default()
        },
    )
}

pub fn trace_pipeline(name: &str, output: OtlpOutput) -> TracePipeline {
    TracePipeline::new(
        name,
        TracePipelineSpec {
            output: TracePipelineOutput { otlp: output },
            ..Default::default()
        },
    )
}

pub fn log_pipeline(name: &str, output: OtlpOutput) -> LogPipeline {
    LogPipeline::new(
        name,
        LogPipelineSpec {
            output: LogPipelineOutput { otlp: output },
            ..Default::default()
        },
    )
}

pub fn secret(name: &str, key: &str) -> SecretKeyRef {
    SecretKeyRef::new("telemetry", name, key)
}

pub fn no_secrets() -> Arc<dyn SecretResolver> {
    Arc::new(StaticSecretResolver::new())
}
