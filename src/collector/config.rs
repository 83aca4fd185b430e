//! Collector configuration document
//!
//! Sections are `BTreeMap`s keyed by component ID so the serialised document
//! is canonical: identical inputs produce byte-identical YAML. Field order of
//! [`Config`] is the section order the collector documentation uses.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::ids::{ComponentKind, ServicePipelineId};
use crate::error::Result;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Config {
    pub extensions: BTreeMap<String, Extension>,
    pub receivers: BTreeMap<String, Receiver>,
    pub processors: BTreeMap<String, Processor>,
    pub exporters: BTreeMap<String, Exporter>,
    pub connectors: BTreeMap<String, Connector>,
    pub service: Service,
}

impl Config {
    /// Canonical YAML rendering
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// IDs of one section, in canonical order
    pub fn ids(&self, kind: ComponentKind) -> Vec<&str> {
        match kind {
            ComponentKind::Receiver => self.receivers.keys().map(String::as_str).collect(),
            ComponentKind::Processor => self.processors.keys().map(String::as_str).collect(),
            ComponentKind::Exporter => self.exporters.keys().map(String::as_str).collect(),
            ComponentKind::Connector => self.connectors.keys().map(String::as_str).collect(),
            ComponentKind::Extension => self.extensions.keys().map(String::as_str).collect(),
        }
    }

    pub fn contains(&self, kind: ComponentKind, id: &str) -> bool {
        match kind {
            ComponentKind::Receiver => self.receivers.contains_key(id),
            ComponentKind::Processor => self.processors.contains_key(id),
            ComponentKind::Exporter => self.exporters.contains_key(id),
            ComponentKind::Connector => self.connectors.contains_key(id),
            ComponentKind::Extension => self.extensions.contains_key(id),
        }
    }

    pub fn pipeline(&self, id: &ServicePipelineId) -> Option<&ServicePipeline> {
        self.service.pipelines.get(id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Service {
    pub extensions: BTreeSet<String>,
    pub pipelines: BTreeMap<ServicePipelineId, ServicePipeline>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Telemetry>,
}

/// Receivers, processors and exporters of one service pipeline, in order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ServicePipeline {
    pub receivers: Vec<String>,
    pub processors: Vec<String>,
    pub exporters: Vec<String>,
}

// ============================================================================
// Collector self-telemetry
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Telemetry {
    pub metrics: TelemetryMetrics,
    pub logs: TelemetryLogs,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetryMetrics {
    pub readers: Vec<MetricReader>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricReader {
    pub pull: PullMetricReader,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PullMetricReader {
    pub exporter: PullExporter,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PullExporter {
    pub prometheus: PrometheusPullExporter,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrometheusPullExporter {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetryLogs {
    pub level: String,
    pub encoding: String,
}

// ============================================================================
// Receivers
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Receiver {
    Otlp(OtlpReceiver),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OtlpReceiver {
    pub protocols: ReceiverProtocols,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReceiverProtocols {
    pub grpc: Endpoint,
    pub http: Endpoint,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub endpoint: String,
}

// ============================================================================
// Processors
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Processor {
    Batch(BatchProcessor),
    MemoryLimiter(MemoryLimiter),
    K8sAttributes(K8sAttributesProcessor),
    Resource(ResourceProcessor),
    ServiceEnrichment(ServiceEnrichmentProcessor),
    IstioNoiseFilter(IstioNoiseFilterProcessor),
    Filter(FilterProcessor),
    Transform(TransformProcessor),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchProcessor {
    pub send_batch_size: u32,
    pub send_batch_max_size: u32,
    pub timeout: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemoryLimiter {
    pub check_interval: String,
    pub limit_percentage: u32,
    pub spike_limit_percentage: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct K8sAttributesProcessor {
    pub auth_type: String,
    pub passthrough: bool,
    pub extract: ExtractK8sMetadata,
    pub pod_association: Vec<PodAssociations>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExtractK8sMetadata {
    pub metadata: Vec<String>,
    pub labels: Vec<ExtractLabel>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExtractLabel {
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub tag_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_regex: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PodAssociations {
    pub sources: Vec<PodAssociation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PodAssociation {
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResourceProcessor {
    pub attributes: Vec<AttributeAction>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttributeAction {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "pattern", skip_serializing_if = "Option::is_none")]
    pub regex_pattern: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceEnrichmentProcessor {
    pub resource_attributes: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IstioNoiseFilterProcessor {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterProcessor {
    pub error_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<FilterProcessorMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces: Option<FilterProcessorTraces>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<FilterProcessorLogs>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterProcessorMetrics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metric: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub datapoint: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterProcessorTraces {
    pub span: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterProcessorLogs {
    pub log_record: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TransformProcessor {
    pub error_mode: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub log_statements: Vec<TransformProcessorStatements>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metric_statements: Vec<TransformProcessorStatements>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace_statements: Vec<TransformProcessorStatements>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransformProcessorStatements {
    pub statements: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
}

// ============================================================================
// Exporters
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Exporter {
    Otlp(OtlpExporter),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OtlpExporter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs_endpoint: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub tls: TlsConfig,
    pub sending_queue: SendingQueue,
    pub retry_on_failure: RetryOnFailure,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<ExporterAuth>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TlsConfig {
    pub insecure: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub insecure_skip_verify: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_pem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_pem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_pem: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SendingQueue {
    pub enabled: bool,
    pub queue_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RetryOnFailure {
    pub enabled: bool,
    pub initial_interval: String,
    pub max_interval: String,
    pub max_elapsed_time: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExporterAuth {
    pub authenticator: String,
}

// ============================================================================
// Connectors
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Connector {
    Forward(ForwardConnector),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ForwardConnector {}

// ============================================================================
// Extensions
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Extension {
    Endpoint(Endpoint),
    K8sLeaderElector(K8sLeaderElector),
    FileStorage(FileStorage),
    OAuth2Client(OAuth2Extension),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct K8sLeaderElector {
    pub auth_type: String,
    pub lease_name: String,
    pub lease_namespace: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileStorage {
    pub directory: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OAuth2Extension {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoint_params: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ids::Signal;

    #[test]
    fn test_sections_serialise_in_canonical_order() {
        let mut config = Config::default();
        config.processors.insert(
            "batch".to_string(),
            Processor::Batch(BatchProcessor {
                send_batch_size: 1024,
                send_batch_max_size: 1024,
                timeout: "10s".to_string(),
            }),
        );
        config.connectors.insert(
            "forward/enrichment-input".to_string(),
            Connector::Forward(ForwardConnector {}),
        );

        let yaml = config.to_yaml().unwrap();
        let positions: Vec<usize> = [
            "extensions:",
            "receivers:",
            "processors:",
            "exporters:",
            "connectors:",
            "service:",
        ]
        .iter()
        .map(|section| yaml.find(section).unwrap())
        .collect();

        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
        assert!(yaml.contains("forward/enrichment-input: {}"));
    }

    #[test]
    fn test_service_pipelines_keep_processor_order() {
        let mut config = Config::default();
        config.service.pipelines.insert(
            ServicePipelineId::output(Signal::Metrics, "p1"),
            ServicePipeline {
                receivers: vec!["forward/enrichment-output".to_string()],
                processors: vec![
                    "transform/user-defined-p1".to_string(),
                    "filter/p1-user-defined".to_string(),
                    "batch".to_string(),
                ],
                exporters: vec!["otlp/p1".to_string()],
            },
        );

        let yaml = config.to_yaml().unwrap();
        let transform = yaml.find("- transform/user-defined-p1").unwrap();
        let filter = yaml.find("- filter/p1-user-defined").unwrap();
        let batch = yaml.find("- batch").unwrap();
        assert!(transform < filter && filter < batch);
        assert!(yaml.contains("metrics/p1-output:"));
    }

    #[test]
    fn test_filter_processor_omits_unused_signals() {
        let filter = FilterProcessor {
            error_mode: "ignore".to_string(),
            metrics: Some(FilterProcessorMetrics {
                metric: vec!["x".to_string()],
                datapoint: vec![],
            }),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&filter).unwrap();
        assert_eq!(yaml, "error_mode: ignore\nmetrics:\n  metric:\n  - x\n");
    }
}
