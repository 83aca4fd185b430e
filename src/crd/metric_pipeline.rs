//! MetricPipeline Custom Resource Definition
//!
//! A MetricPipeline selects metric input sources (runtime, Prometheus, Istio,
//! OTLP push), optionally transforms and filters the data, and ships it to one
//! OTLP backend.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    validate_namespace_selector, FilterSpec, NamespaceSelector, OtlpOutput, PipelineStatus,
    TransformSpec,
};

/// The MetricPipeline CRD
///
/// # Example
///
/// ```yaml
/// apiVersion: telemetry.kyma-project.io/v1alpha1
/// kind: MetricPipeline
/// metadata:
///   name: backend
/// spec:
///   input:
///     runtime:
///       enabled: true
///       namespaces:
///         exclude: ["kube-system"]
///     otlp:
///       namespaces:
///         include: ["shop"]
///   output:
///     otlp:
///       protocol: grpc
///       endpoint:
///         value: "https://backend:4317"
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "telemetry.kyma-project.io",
    version = "v1alpha1",
    kind = "MetricPipeline",
    status = "PipelineStatus",
    shortname = "mp",
    printcolumn = r#"{"name":"Configuration Generated","type":"string","jsonPath":".status.conditions[?(@.type=='ConfigurationGenerated')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MetricPipelineSpec {
    #[serde(default)]
    pub input: MetricPipelineInput,

    /// OTTL transformations applied before export
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformSpec>,

    /// OTTL conditions; matching data points are dropped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterSpec>,

    pub output: MetricPipelineOutput,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetricPipelineOutput {
    pub otlp: OtlpOutput,
}

/// Input source families a metric pipeline can enable
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricInputSource {
    Runtime,
    Prometheus,
    Istio,
    Otlp,
}

impl MetricInputSource {
    pub const ALL: [MetricInputSource; 4] = [
        MetricInputSource::Runtime,
        MetricInputSource::Prometheus,
        MetricInputSource::Istio,
        MetricInputSource::Otlp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricInputSource::Runtime => "runtime",
            MetricInputSource::Prometheus => "prometheus",
            MetricInputSource::Istio => "istio",
            MetricInputSource::Otlp => "otlp",
        }
    }
}

/// Kubernetes resource kinds the runtime input reports on
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuntimeResource {
    Pod,
    Container,
    Node,
    Volume,
    Deployment,
    DaemonSet,
    StatefulSet,
    Job,
}

impl RuntimeResource {
    pub const ALL: [RuntimeResource; 8] = [
        RuntimeResource::Pod,
        RuntimeResource::Container,
        RuntimeResource::Node,
        RuntimeResource::Volume,
        RuntimeResource::Deployment,
        RuntimeResource::DaemonSet,
        RuntimeResource::StatefulSet,
        RuntimeResource::Job,
    ];
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetricPipelineInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeInput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<PrometheusInput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub istio: Option<IstioInput>,

    /// OTLP push input; enabled unless explicitly disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp: Option<OtlpInput>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInput {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<NamespaceSelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<RuntimeResources>,
}

/// Per-resource toggles; an absent entry means enabled
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<ResourceToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ResourceToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<ResourceToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<ResourceToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<ResourceToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemonset: Option<ResourceToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statefulset: Option<ResourceToggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<ResourceToggle>,
}

impl RuntimeResources {
    fn toggle(&self, resource: RuntimeResource) -> Option<&ResourceToggle> {
        match resource {
            RuntimeResource::Pod => self.pod.as_ref(),
            RuntimeResource::Container => self.container.as_ref(),
            RuntimeResource::Node => self.node.as_ref(),
            RuntimeResource::Volume => self.volume.as_ref(),
            RuntimeResource::Deployment => self.deployment.as_ref(),
            RuntimeResource::DaemonSet => self.daemonset.as_ref(),
            RuntimeResource::StatefulSet => self.statefulset.as_ref(),
            RuntimeResource::Job => self.job.as_ref(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ResourceToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusInput {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<NamespaceSelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_metrics: Option<Toggle>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IstioInput {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<NamespaceSelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_metrics: Option<Toggle>,

    /// Envoy proxy metrics (`envoy_*`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envoy_metrics: Option<Toggle>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OtlpInput {
    #[serde(default)]
    pub disabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<NamespaceSelector>,
}

/// Opt-in switch, disabled unless set
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Toggle {
    #[serde(default)]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl MetricPipelineInput {
    pub fn is_enabled(&self, source: MetricInputSource) -> bool {
        match source {
            MetricInputSource::Runtime => self.runtime.as_ref().is_some_and(|r| r.enabled),
            MetricInputSource::Prometheus => self.prometheus.as_ref().is_some_and(|p| p.enabled),
            MetricInputSource::Istio => self.istio.as_ref().is_some_and(|i| i.enabled),
            MetricInputSource::Otlp => self.otlp.as_ref().map_or(true, |o| !o.disabled),
        }
    }

    /// Namespace selector of an input, only if that input is enabled
    pub fn namespaces(&self, source: MetricInputSource) -> Option<&NamespaceSelector> {
        if !self.is_enabled(source) {
            return None;
        }
        match source {
            MetricInputSource::Runtime => self.runtime.as_ref()?.namespaces.as_ref(),
            MetricInputSource::Prometheus => self.prometheus.as_ref()?.namespaces.as_ref(),
            MetricInputSource::Istio => self.istio.as_ref()?.namespaces.as_ref(),
            MetricInputSource::Otlp => self.otlp.as_ref()?.namespaces.as_ref(),
        }
    }

    pub fn is_runtime_resource_enabled(&self, resource: RuntimeResource) -> bool {
        self.runtime
            .as_ref()
            .and_then(|r| r.resources.as_ref())
            .and_then(|r| r.toggle(resource))
            .map_or(true, |t| t.enabled)
    }

    pub fn is_envoy_metrics_enabled(&self) -> bool {
        self.istio
            .as_ref()
            .and_then(|i| i.envoy_metrics.as_ref())
            .is_some_and(|t| t.enabled)
    }

    /// Diagnostic scrape metrics (`up`, `scrape_*`) for Prometheus or Istio
    pub fn is_diagnostic_enabled(&self, source: MetricInputSource) -> bool {
        let toggle = match source {
            MetricInputSource::Prometheus => self
                .prometheus
                .as_ref()
                .and_then(|p| p.diagnostic_metrics.as_ref()),
            MetricInputSource::Istio => self.istio.as_ref().and_then(|i| i.diagnostic_metrics.as_ref()),
            _ => None,
        };
        toggle.is_some_and(|t| t.enabled)
    }
}

impl MetricPipelineSpec {
    /// Validate the spec
    pub fn validate(&self) -> Result<(), String> {
        self.output.otlp.validate()?;

        for source in MetricInputSource::ALL {
            let field = format!("input.{}", source.as_str());
            validate_namespace_selector(&field, self.input.namespaces(source))?;
        }

        for (i, transform) in self.transforms.iter().enumerate() {
            if transform.statements.is_empty() {
                return Err(format!("transforms[{i}] must contain at least one statement"));
            }
        }

        for (i, filter) in self.filters.iter().enumerate() {
            if filter.conditions.is_empty() {
                return Err(format!("filters[{i}] must contain at least one condition"));
            }
        }

        Ok(())
    }
}
