//! Log gateway configuration
//!
//! One `logs/<p>` service pipeline per OTLP log pipeline.

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
use crate::crd::{LogPipeline, MetricInputSource, OtlpOutput};
use crate::error::Result;

const SIGNAL: Signal = Signal::Logs;

pub struct LogGatewayBuilder {
    resolver: Arc<dyn SecretResolver>,
    options: BuildOptions,
}

impl LogGatewayBuilder {
    pub fn new(resolver: Arc<dyn SecretResolver>, options: BuildOptions) -> Self {
        Self { resolver, options }
    }

    pub async fn build(
        &self,
        cancel: &CancellationToken,
        pipelines: &[LogPipeline],
    ) -> Result<BuildOutput> {
        gateway::build::<LogCompiler, _>(
            cancel,
            self.resolver.as_ref(),
            &self.options,
            pipelines,
            |_| LogCompiler {
                options: self.options.clone(),
            },
        )
        .await
    }
}

struct LogCompiler {
    options: BuildOptions,
}

impl GatewayCompiler for LogCompiler {
    type Pipeline = LogPipeline;

    const SIGNAL: Signal = SIGNAL;

    fn validate(pipeline: &LogPipeline) -> std::result::Result<(), String> {
        pipeline.spec.validate()
    }

    fn output(pipeline: &LogPipeline) -> &OtlpOutput {
        &pipeline.spec.output.otlp
    }

    #[instrument(skip_all, fields(pipeline = %name))]
    fn compile(
        &self,
        name: &str,
        pipeline: &LogPipeline,
        mut exporter: ExporterParts,
    ) -> Result<Fragment> {
        let spec = &pipeline.spec;

        let mut fragment = Fragment::new();
        take_oauth2(&mut fragment, &mut exporter)?;

        let mut logs = fragment.pipeline(ServicePipelineId::single(SIGNAL, name));
        logs.receiver(StaticId::OtlpReceiver.as_str(), components::otlp_receiver())?
            .processor(
                StaticId::MemoryLimiter.as_str(),
                Some(components::memory_limiter()),
            )?
            .processor(
                StaticId::DropIfInputSource(MetricInputSource::Otlp).as_str(),
                (!spec.input.is_otlp_enabled()).then(components::drop_all_logs),
            )?
            .processor(
                &pipeline_id(PipelineTemplate::LogNamespaceFilter, name),
                components::namespace_filter(SIGNAL, spec.input.otlp_namespaces(), ""),
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
        logs.finish()?;

        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::config::Processor;
    use crate::collector::secrets::StaticSecretResolver;
    use crate::crd::{
        LogOtlpInput, LogPipelineInput, LogPipelineOutput, LogPipelineSpec, NamespaceSelector,
        OtlpOutput, ValueType,
    };

    fn pipeline(name: &str, otlp: Option<LogOtlpInput>) -> LogPipeline {
        LogPipeline::new(
            name,
            LogPipelineSpec {
                input: LogPipelineInput { otlp },
                output: LogPipelineOutput {
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
    async fn test_namespace_filter_has_no_source_guard() {
        let otlp = LogOtlpInput {
            disabled: false,
            namespaces: Some(NamespaceSelector {
                include: vec![],
                exclude: vec!["kube-system".to_string()],
            }),
        };
        let builder =
            LogGatewayBuilder::new(Arc::new(StaticSecretResolver::new()), BuildOptions::default());
        let output = builder
            .build(&CancellationToken::new(), &[pipeline("p", Some(otlp))])
            .await
            .unwrap();

        let Some(Processor::Filter(filter)) =
            output.config.processors.get("filter/p-filter-by-namespace")
        else {
            panic!("expected namespace filter");
        };
        let conditions = &filter.logs.as_ref().unwrap().log_record;
        assert_eq!(
            conditions,
            &vec![r#"resource.attributes["k8s.namespace.name"] == "kube-system""#.to_string()]
        );

        let logs = output
            .config
            .pipeline(&ServicePipelineId::single(SIGNAL, "p"))
            .unwrap();
        assert_eq!(logs.processors[1], "filter/p-filter-by-namespace");
        assert!(!output
            .config
            .processors
            .contains_key("filter/drop-if-input-source-otlp"));
    }
}
