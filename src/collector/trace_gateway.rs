//! Trace gateway configuration
//!
//! One `traces/<p>` service pipeline per trace pipeline; enrichment runs inline.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::components;
use super::fragment::Fragment;
use super::gateway::{self, take_oauth2, BuildOutput, GatewayCompiler};
use super::ids::{pipeline_id, PipelineTemplate, ServicePipelineId, Signal, StaticId};
use super::options::BuildOptions;
use super::otlp_exporter::ExporterParts;
use super::secrets::SecretResolver;
use crate::crd::{OtlpOutput, TracePipeline};
use crate::error::Result;

const SIGNAL: Signal = Signal::Traces;

pub struct TraceGatewayBuilder {
    resolver: Arc<dyn SecretResolver>,
    options: BuildOptions,
}

impl TraceGatewayBuilder {
    pub fn new(resolver: Arc<dyn SecretResolver>, options: BuildOptions) -> Self {
        Self { resolver, options }
    }

    pub async fn build(
        &self,
        cancel: &CancellationToken,
        pipelines: &[TracePipeline],
    ) -> Result<BuildOutput> {
        gateway::build::<TraceCompiler, _>(
            cancel,
            self.resolver.as_ref(),
            &self.options,
            pipelines,
            |_| TraceCompiler {
                options: self.options.clone(),
            },
        )
        .await
    }
}

struct TraceCompiler {
    options: BuildOptions,
}

impl GatewayCompiler for TraceCompiler {
    type Pipeline = TracePipeline;

    const SIGNAL: Signal = SIGNAL;

    fn validate(pipeline: &TracePipeline) -> std::result::Result<(), String> {
        pipeline.spec.validate()
    }

    fn output(pipeline: &TracePipeline) -> &OtlpOutput {
        &pipeline.spec.output.otlp
    }

    #[instrument(skip_all, fields(pipeline = %name))]
    fn compile(
        &self,
        name: &str,
        pipeline: &TracePipeline,
        mut exporter: ExporterParts,
    ) -> Result<Fragment> {
        let spec = &pipeline.spec;

        let mut fragment = Fragment::new();
        take_oauth2(&mut fragment, &mut exporter)?;

        let mut traces = fragment.pipeline(ServicePipelineId::single(SIGNAL, name));
        traces
            .receiver(StaticId::OtlpReceiver.as_str(), components::otlp_receiver())?
            .processor(
                StaticId::MemoryLimiter.as_str(),
                Some(components::memory_limiter()),
            )?
            .processor(
                StaticId::K8sAttributes.as_str(),
                Some(components::k8s_attributes(&self.options.enrichments)),
            )?
            .processor(
                StaticId::IstioNoiseFilter.as_str(),
                Some(components::istio_noise_filter()),
            )?
            .processor(
                StaticId::InsertClusterAttributes.as_str(),
                Some(components::insert_cluster_attributes(&self.options.cluster)),
            )?
            .processor(
                StaticId::ServiceEnrichment.as_str(),
                Some(components::service_enrichment()),
            )?
            .processor(
                &pipeline_id(PipelineTemplate::UserDefinedTransform, name),
                components::user_defined_transform(SIGNAL, &spec.transforms),
            )?
            .processor(
                &pipeline_id(PipelineTemplate::UserDefinedFilter, name),
                components::user_defined_filter(SIGNAL, &spec.filters),
            )?
            .processor(
                StaticId::DropKymaAttributes.as_str(),
                Some(components::drop_kyma_attributes()),
            )?
            .processor(StaticId::Batch.as_str(), Some(components::batch_processor()))?
            .exporter(&exporter.id, exporter.exporter)?;
        traces.finish()?;

        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::secrets::StaticSecretResolver;
    use crate::crd::{FilterSpec, OtlpOutput, TracePipelineOutput, TracePipelineSpec, ValueType};

    fn pipeline(name: &str) -> TracePipeline {
        TracePipeline::new(
            name,
            TracePipelineSpec {
                output: TracePipelineOutput {
                    otlp: OtlpOutput {
                        endpoint: ValueType::inline("https://b:4317"),
                        ..Default::default()
                    },
                },
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_single_service_pipeline_per_trace_pipeline() {
        let mut with_filter = pipeline("b");
        with_filter.spec.filters.push(FilterSpec {
            conditions: vec![r#"attributes["http.route"] == "/healthz""#.to_string()],
        });

        let builder = TraceGatewayBuilder::new(
            Arc::new(StaticSecretResolver::new()),
            BuildOptions::default(),
        );
        let output = builder
            .build(&CancellationToken::new(), &[with_filter, pipeline("a")])
            .await
            .unwrap();

        let ids: Vec<String> = output
            .config
            .service
            .pipelines
            .keys()
            .map(ToString::to_string)
            .collect();
        assert_eq!(ids, vec!["traces/a", "traces/b"]);

        let a = output
            .config
            .pipeline(&ServicePipelineId::single(SIGNAL, "a"))
            .unwrap();
        assert_eq!(
            a.processors,
            vec![
                "memory_limiter",
                "k8sattributes",
                "istio_noise_filter",
                "resource/insert-cluster-attributes",
                "service_enrichment",
                "resource/drop-kyma-attributes",
                "batch",
            ]
        );

        let b = output
            .config
            .pipeline(&ServicePipelineId::single(SIGNAL, "b"))
            .unwrap();
        assert!(b.processors.contains(&"filter/b-user-defined".to_string()));
        assert!(output.config.connectors.is_empty());
        assert_eq!(output.env.len(), 2);
    }
}
