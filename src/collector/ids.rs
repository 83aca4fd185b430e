//! Component and service pipeline identifiers
//!
//! Static IDs are shared by every pipeline and appear at most once per
//! document. Per-pipeline IDs embed the pipeline name so they never collide
//! across pipelines with distinct names.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::crd::{MetricInputSource, OtlpProtocol, RuntimeResource};

/// Telemetry signal a collector pipeline carries
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Signal {
    Logs,
    Metrics,
    Traces,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Logs => "logs",
            Signal::Metrics => "metrics",
            Signal::Traces => "traces",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level section a component lives in
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentKind {
    Receiver,
    Processor,
    Exporter,
    Connector,
    Extension,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Receiver => "receiver",
            ComponentKind::Processor => "processor",
            ComponentKind::Exporter => "exporter",
            ComponentKind::Connector => "connector",
            ComponentKind::Extension => "extension",
        };
        f.write_str(name)
    }
}

/// Closed catalogue of static component IDs
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StaticId {
    OtlpReceiver,

    Batch,
    MemoryLimiter,
    K8sAttributes,
    InsertClusterAttributes,
    DropKymaAttributes,
    ServiceEnrichment,
    IstioNoiseFilter,
    DropIfInputSource(MetricInputSource),
    DropEnvoyMetricsIfDisabled,
    DropRuntimeMetrics(RuntimeResource),
    DropPrometheusDiagnosticMetrics,
    DropIstioDiagnosticMetrics,

    EnrichmentInputConnector,
    EnrichmentOutputConnector,

    HealthCheck,
    Pprof,
    K8sLeaderElector,
    FileStorage,
}

impl StaticId {
    /// Every static ID the builder can emit
    pub const ALL: [StaticId; 29] = [
        StaticId::OtlpReceiver,
        StaticId::Batch,
        StaticId::MemoryLimiter,
        StaticId::K8sAttributes,
        StaticId::InsertClusterAttributes,
        StaticId::DropKymaAttributes,
        StaticId::ServiceEnrichment,
        StaticId::IstioNoiseFilter,
        StaticId::DropIfInputSource(MetricInputSource::Runtime),
        StaticId::DropIfInputSource(MetricInputSource::Prometheus),
        StaticId::DropIfInputSource(MetricInputSource::Istio),
        StaticId::DropIfInputSource(MetricInputSource::Otlp),
        StaticId::DropEnvoyMetricsIfDisabled,
        StaticId::DropRuntimeMetrics(RuntimeResource::Pod),
        StaticId::DropRuntimeMetrics(RuntimeResource::Container),
        StaticId::DropRuntimeMetrics(RuntimeResource::Node),
        StaticId::DropRuntimeMetrics(RuntimeResource::Volume),
        StaticId::DropRuntimeMetrics(RuntimeResource::Deployment),
        StaticId::DropRuntimeMetrics(RuntimeResource::DaemonSet),
        StaticId::DropRuntimeMetrics(RuntimeResource::StatefulSet),
        StaticId::DropRuntimeMetrics(RuntimeResource::Job),
        StaticId::DropPrometheusDiagnosticMetrics,
        StaticId::DropIstioDiagnosticMetrics,
        StaticId::EnrichmentInputConnector,
        StaticId::EnrichmentOutputConnector,
        StaticId::HealthCheck,
        StaticId::Pprof,
        StaticId::K8sLeaderElector,
        StaticId::FileStorage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StaticId::OtlpReceiver => "otlp",
            StaticId::Batch => "batch",
            StaticId::MemoryLimiter => "memory_limiter",
            StaticId::K8sAttributes => "k8sattributes",
            StaticId::InsertClusterAttributes => "resource/insert-cluster-attributes",
            StaticId::DropKymaAttributes => "resource/drop-kyma-attributes",
            StaticId::ServiceEnrichment => "service_enrichment",
            StaticId::IstioNoiseFilter => "istio_noise_filter",
            StaticId::DropIfInputSource(source) => match source {
                MetricInputSource::Runtime => "filter/drop-if-input-source-runtime",
                MetricInputSource::Prometheus => "filter/drop-if-input-source-prometheus",
                MetricInputSource::Istio => "filter/drop-if-input-source-istio",
                MetricInputSource::Otlp => "filter/drop-if-input-source-otlp",
            },
            StaticId::DropEnvoyMetricsIfDisabled => "filter/drop-envoy-metrics-if-disabled",
            StaticId::DropRuntimeMetrics(resource) => match resource {
                RuntimeResource::Pod => "filter/drop-runtime-pod-metrics",
                RuntimeResource::Container => "filter/drop-runtime-container-metrics",
                RuntimeResource::Node => "filter/drop-runtime-node-metrics",
                RuntimeResource::Volume => "filter/drop-runtime-volume-metrics",
                RuntimeResource::Deployment => "filter/drop-runtime-deployment-metrics",
                RuntimeResource::DaemonSet => "filter/drop-runtime-daemonset-metrics",
                RuntimeResource::StatefulSet => "filter/drop-runtime-statefulset-metrics",
                RuntimeResource::Job => "filter/drop-runtime-job-metrics",
            },
            StaticId::DropPrometheusDiagnosticMetrics => {
                "filter/drop-diagnostic-metrics-if-input-source-prometheus"
            }
            StaticId::DropIstioDiagnosticMetrics => {
                "filter/drop-diagnostic-metrics-if-input-source-istio"
            }
            StaticId::EnrichmentInputConnector => "forward/enrichment-input",
            StaticId::EnrichmentOutputConnector => "forward/enrichment-output",
            StaticId::HealthCheck => "health_check",
            StaticId::Pprof => "pprof",
            StaticId::K8sLeaderElector => "k8s_leader_elector",
            StaticId::FileStorage => "file_storage",
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            StaticId::OtlpReceiver => ComponentKind::Receiver,
            StaticId::EnrichmentInputConnector | StaticId::EnrichmentOutputConnector => {
                ComponentKind::Connector
            }
            StaticId::HealthCheck
            | StaticId::Pprof
            | StaticId::K8sLeaderElector
            | StaticId::FileStorage => ComponentKind::Extension,
            _ => ComponentKind::Processor,
        }
    }
}

impl fmt::Display for StaticId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-pipeline ID templates; the pipeline name fills the only free slot
///
/// Templates sharing a component type differ in a fixed suffix, so two names
/// never format to the same ID through different templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineTemplate {
    /// `filter/<name>-filter-by-namespace-<source>-input`
    NamespaceFilter(MetricInputSource),
    /// `filter/<name>-filter-by-namespace`
    LogNamespaceFilter,
    /// `transform/user-defined-<name>`
    UserDefinedTransform,
    /// `filter/<name>-user-defined`
    UserDefinedFilter,
    /// `oauth2client/<name>`
    OAuth2Extension,
}

impl PipelineTemplate {
    pub fn kind(&self) -> ComponentKind {
        match self {
            PipelineTemplate::OAuth2Extension => ComponentKind::Extension,
            _ => ComponentKind::Processor,
        }
    }
}

/// Formats a per-pipeline component ID
pub fn pipeline_id(template: PipelineTemplate, pipeline: &str) -> String {
    match template {
        PipelineTemplate::NamespaceFilter(source) => {
            format!("filter/{pipeline}-filter-by-namespace-{}-input", source.as_str())
        }
        PipelineTemplate::LogNamespaceFilter => format!("filter/{pipeline}-filter-by-namespace"),
        PipelineTemplate::UserDefinedTransform => format!("transform/user-defined-{pipeline}"),
        PipelineTemplate::UserDefinedFilter => format!("filter/{pipeline}-user-defined"),
        PipelineTemplate::OAuth2Extension => format!("oauth2client/{pipeline}"),
    }
}

/// OTLP exporter ID; HTTP and gRPC exporters use different component types
pub fn exporter_id(protocol: OtlpProtocol, pipeline: &str) -> String {
    match protocol {
        OtlpProtocol::Http => format!("otlphttp/{pipeline}"),
        OtlpProtocol::Grpc => format!("otlp/{pipeline}"),
    }
}

/// Position of a service pipeline within a user pipeline's chain
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// The whole chain in one service pipeline (`traces/<name>`)
    Single,
    Input,
    /// Shared by all user pipelines (`metrics/enrichment`)
    Shared,
    Output,
}

/// Key of a service pipeline; ordering is pipeline name, signal, segment
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServicePipelineId {
    pipeline: String,
    signal: Signal,
    segment: Segment,
}

impl ServicePipelineId {
    pub fn single(signal: Signal, pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            signal,
            segment: Segment::Single,
        }
    }

    pub fn input(signal: Signal, pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            signal,
            segment: Segment::Input,
        }
    }

    pub fn output(signal: Signal, pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            signal,
            segment: Segment::Output,
        }
    }

    /// The shared metric enrichment pipeline
    pub fn enrichment(signal: Signal) -> Self {
        Self {
            pipeline: "enrichment".to_string(),
            signal,
            segment: Segment::Shared,
        }
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    /// User pipeline this service pipeline belongs to, `None` when shared
    pub fn owner(&self) -> Option<&str> {
        match self.segment {
            Segment::Shared => None,
            _ => Some(&self.pipeline),
        }
    }
}

impl fmt::Display for ServicePipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.segment {
            Segment::Single | Segment::Shared => write!(f, "{}/{}", self.signal, self.pipeline),
            Segment::Input => write!(f, "{}/{}-input", self.signal, self.pipeline),
            Segment::Output => write!(f, "{}/{}-output", self.signal, self.pipeline),
        }
    }
}

impl Serialize for ServicePipelineId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
