//! Metric gateway configuration
//!
//! Each metric pipeline `p` gets three service pipelines:
//!
//! - `metrics/p-input`: OTLP receiver, input source and namespace filters,
//!   exporting into `forward/enrichment-input`
//! - `metrics/enrichment`: shared by all pipelines, attaches Kubernetes and
//!   cluster metadata between the two forward connectors
//! - `metrics/p-output`: user transforms and filters, attribute cleanup,
//!   batching and the pipeline's OTLP exporter

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::components;
use super::fragment::Fragment;
use super::gateway::{self, take_oauth2, BuildOutput, GatewayCompiler};
use super::ids::{pipeline_id, PipelineTemplate, ServicePipelineId, Signal, StaticId};
use super::options::BuildOptions;
use super::otlp_exporter::ExporterParts;
use super::ottl;
use super::secrets::SecretResolver;
use crate::crd::{MetricInputSource, MetricPipeline, OtlpOutput, RuntimeResource};
use crate::error::Result;

const SIGNAL: Signal = Signal::Metrics;

pub struct MetricGatewayBuilder {
    resolver: Arc<dyn SecretResolver>,
    options: BuildOptions,
}

impl MetricGatewayBuilder {
    pub fn new(resolver: Arc<dyn SecretResolver>, options: BuildOptions) -> Self {
        Self { resolver, options }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Builds the metric gateway configuration for `pipelines`
    pub async fn build(
        &self,
        cancel: &CancellationToken,
        pipelines: &[MetricPipeline],
    ) -> Result<BuildOutput> {
        gateway::build::<MetricCompiler, _>(
            cancel,
            self.resolver.as_ref(),
            &self.options,
            pipelines,
            |accepted| MetricCompiler::new(&self.options, accepted),
        )
        .await
    }
}

/// Compiles metric pipelines against the input sources active in the build
struct MetricCompiler {
    options: BuildOptions,
    /// OTLP is always active; other sources when at least one pipeline enables them
    active: BTreeSet<MetricInputSource>,
}

impl MetricCompiler {
    fn new(options: &BuildOptions, pipelines: &[&MetricPipeline]) -> Self {
        let active = MetricInputSource::ALL
            .into_iter()
            .filter(|source| {
                *source == MetricInputSource::Otlp
                    || pipelines.iter().any(|p| p.spec.input.is_enabled(*source))
            })
            .collect();
        Self {
            options: options.clone(),
            active,
        }
    }

    fn is_active(&self, source: MetricInputSource) -> bool {
        self.active.contains(&source)
    }
}

impl GatewayCompiler for MetricCompiler {
    type Pipeline = MetricPipeline;

    const SIGNAL: Signal = SIGNAL;

    fn validate(pipeline: &MetricPipeline) -> std::result::Result<(), String> {
        pipeline.spec.validate()
    }

    fn output(pipeline: &MetricPipeline) -> &OtlpOutput {
        &pipeline.spec.output.otlp
    }

    #[instrument(skip_all, fields(pipeline = %name))]
    fn compile(
        &self,
        name: &str,
        pipeline: &MetricPipeline,
        mut exporter: ExporterParts,
    ) -> Result<Fragment> {
        let spec = &pipeline.spec;
        let input = &spec.input;

        let mut fragment = Fragment::new();
        take_oauth2(&mut fragment, &mut exporter)?;

        let mut assembly = fragment.pipeline(ServicePipelineId::input(SIGNAL, name));
        assembly.receiver(StaticId::OtlpReceiver.as_str(), components::otlp_receiver())?;

        for source in MetricInputSource::ALL {
            let drop = self.is_active(source) && !input.is_enabled(source);
            assembly.processor(
                StaticId::DropIfInputSource(source).as_str(),
                drop.then(|| components::drop_if_input_source(source)),
            )?;
        }

        let keep_envoy =
            input.is_enabled(MetricInputSource::Istio) && input.is_envoy_metrics_enabled();
        assembly.processor(
            StaticId::DropEnvoyMetricsIfDisabled.as_str(),
            (self.is_active(MetricInputSource::Istio) && !keep_envoy)
                .then(components::drop_envoy_metrics),
        )?;

        for source in MetricInputSource::ALL {
            assembly.processor(
                &pipeline_id(PipelineTemplate::NamespaceFilter(source), name),
                components::namespace_filter(
                    SIGNAL,
                    input.namespaces(source),
                    &ottl::input_source_equals(source),
                ),
            )?;
        }

        if input.is_enabled(MetricInputSource::Runtime) {
            for resource in RuntimeResource::ALL {
                assembly.processor(
                    StaticId::DropRuntimeMetrics(resource).as_str(),
                    (!input.is_runtime_resource_enabled(resource))
                        .then(|| components::drop_runtime_metrics(resource)),
                )?;
            }
        }

        for (source, id) in [
            (
                MetricInputSource::Prometheus,
                StaticId::DropPrometheusDiagnosticMetrics,
            ),
            (MetricInputSource::Istio, StaticId::DropIstioDiagnosticMetrics),
        ] {
            let drop = input.is_enabled(source) && !input.is_diagnostic_enabled(source);
            assembly.processor(
                id.as_str(),
                drop.then(|| components::drop_diagnostic_metrics(source)),
            )?;
        }

        assembly.exporter_connector(
            StaticId::EnrichmentInputConnector.as_str(),
            components::forward_connector(),
        )?;
        assembly.finish()?;

        let mut enrichment = fragment.pipeline(ServicePipelineId::enrichment(SIGNAL));
        enrichment
            .receiver_connector(
                StaticId::EnrichmentInputConnector.as_str(),
                components::forward_connector(),
            )?
            .processor(
                StaticId::K8sAttributes.as_str(),
                Some(components::k8s_attributes(&self.options.enrichments)),
            )?
            .processor(
                StaticId::InsertClusterAttributes.as_str(),
                Some(components::insert_cluster_attributes(&self.options.cluster)),
            )?
            .processor(
                StaticId::ServiceEnrichment.as_str(),
                Some(components::service_enrichment()),
            )?
            .exporter_connector(
                StaticId::EnrichmentOutputConnector.as_str(),
                components::forward_connector(),
            )?;
        enrichment.finish()?;

        let mut output = fragment.pipeline(ServicePipelineId::output(SIGNAL, name));
        output
            .receiver_connector(
                StaticId::EnrichmentOutputConnector.as_str(),
                components::forward_connector(),
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
        output.finish()?;

        Ok(fragment)
    }
}
