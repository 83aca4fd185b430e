//! Component config constructors
//!
//! Pure functions producing the typed body of one component. Constructors of
//! conditional components return `None` when the component is not needed; a
//! `None` body is never defined and never referenced.

use super::config::{
    AttributeAction, BatchProcessor, Connector, Endpoint, ExtractK8sMetadata, ExtractLabel,
    Extension, FileStorage, FilterProcessor, FilterProcessorLogs, FilterProcessorMetrics,
    FilterProcessorTraces, ForwardConnector, IstioNoiseFilterProcessor, K8sAttributesProcessor,
    K8sLeaderElector, MemoryLimiter, MetricReader, OtlpReceiver, PodAssociation,
    PodAssociations, PrometheusPullExporter, Processor, PullExporter, PullMetricReader, Receiver,
    ReceiverProtocols, ResourceProcessor, ServiceEnrichmentProcessor, Telemetry, TelemetryLogs,
    TelemetryMetrics, TransformProcessor, TransformProcessorStatements,
};
use super::ids::Signal;
use super::options::{ClusterInfo, Enrichments};
use super::ottl;
use crate::crd::{FilterSpec, MetricInputSource, NamespaceSelector, RuntimeResource, TransformSpec};

/// Placeholder the collector resolves to its own pod IP
pub const POD_IP_PLACEHOLDER: &str = "${MY_POD_IP}";

/// Lease shared by all metric gateway replicas
pub const LEADER_ELECTION_LEASE_NAME: &str = "telemetry-metric-gateway-kymastats";

const ERROR_MODE_IGNORE: &str = "ignore";

const KYMA_K8S_IO_APP_NAME: &str = "kyma.kubernetes_io_app_name";
const KYMA_APP_NAME: &str = "kyma.app_name";

const DIAGNOSTIC_METRIC_NAMES: [&str; 5] = [
    "up",
    "scrape_duration_seconds",
    "scrape_samples_scraped",
    "scrape_samples_post_metric_relabeling",
    "scrape_series_added",
];

// ============================================================================
// Receivers and connectors
// ============================================================================

pub fn otlp_receiver() -> Receiver {
    Receiver::Otlp(OtlpReceiver {
        protocols: ReceiverProtocols {
            grpc: Endpoint {
                endpoint: format!("{POD_IP_PLACEHOLDER}:4317"),
            },
            http: Endpoint {
                endpoint: format!("{POD_IP_PLACEHOLDER}:4318"),
            },
        },
    })
}

pub fn forward_connector() -> Connector {
    Connector::Forward(ForwardConnector {})
}

// ============================================================================
// Shared processors
// ============================================================================

pub fn batch_processor() -> Processor {
    Processor::Batch(BatchProcessor {
        send_batch_size: 1024,
        send_batch_max_size: 1024,
        timeout: "10s".to_string(),
    })
}

pub fn memory_limiter() -> Processor {
    Processor::MemoryLimiter(MemoryLimiter {
        check_interval: "1s".to_string(),
        limit_percentage: 75,
        spike_limit_percentage: 15,
    })
}

pub fn k8s_attributes(enrichments: &Enrichments) -> Processor {
    let metadata = [
        "k8s.pod.name",
        "k8s.node.name",
        "k8s.namespace.name",
        "k8s.deployment.name",
        "k8s.statefulset.name",
        "k8s.daemonset.name",
        "k8s.cronjob.name",
        "k8s.job.name",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    let mut labels = vec![
        label("pod", "app.kubernetes.io/name", KYMA_K8S_IO_APP_NAME),
        label("pod", "app", KYMA_APP_NAME),
        label("node", "topology.kubernetes.io/region", "cloud.region"),
        label("node", "topology.kubernetes.io/zone", "cloud.availability_zone"),
        label("node", "node.kubernetes.io/instance-type", "host.type"),
        label("node", "kubernetes.io/arch", "host.arch"),
    ];

    for pod_label in &enrichments.extract_pod_labels {
        let key_regex = match (pod_label.key_prefix.as_deref(), pod_label.key.as_deref()) {
            (Some(prefix), _) if !prefix.is_empty() => format!("({prefix}.*)"),
            (_, Some(key)) => format!("(^{key}$)"),
            _ => continue,
        };
        labels.push(ExtractLabel {
            from: "pod".to_string(),
            key: None,
            tag_name: "k8s.pod.label.$0".to_string(),
            key_regex: Some(key_regex),
        });
    }

    let pod_association = vec![
        association("resource_attribute", Some("k8s.pod.ip")),
        association("resource_attribute", Some("k8s.pod.uid")),
        association("connection", None),
    ];

    Processor::K8sAttributes(K8sAttributesProcessor {
        auth_type: "serviceAccount".to_string(),
        passthrough: false,
        extract: ExtractK8sMetadata { metadata, labels },
        pod_association,
    })
}

fn label(from: &str, key: &str, tag_name: &str) -> ExtractLabel {
    ExtractLabel {
        from: from.to_string(),
        key: Some(key.to_string()),
        tag_name: tag_name.to_string(),
        key_regex: None,
    }
}

fn association(from: &str, name: Option<&str>) -> PodAssociations {
    PodAssociations {
        sources: vec![PodAssociation {
            from: from.to_string(),
            name: name.map(String::from),
        }],
    }
}

pub fn insert_cluster_attributes(cluster: &ClusterInfo) -> Processor {
    let mut attributes = vec![
        insert("k8s.cluster.name", &cluster.name),
        insert("k8s.cluster.uid", &cluster.uid),
    ];
    if let Some(provider) = cluster.cloud_provider.as_deref().filter(|p| !p.is_empty()) {
        attributes.push(insert("cloud.provider", provider));
    }
    Processor::Resource(ResourceProcessor { attributes })
}

fn insert(key: &str, value: &str) -> AttributeAction {
    AttributeAction {
        action: "insert".to_string(),
        key: Some(key.to_string()),
        value: Some(value.to_string()),
        regex_pattern: None,
    }
}

pub fn service_enrichment() -> Processor {
    Processor::ServiceEnrichment(ServiceEnrichmentProcessor {
        resource_attributes: vec![KYMA_K8S_IO_APP_NAME.to_string(), KYMA_APP_NAME.to_string()],
    })
}

/// Removes the internal `kyma.*` attributes before export
pub fn drop_kyma_attributes() -> Processor {
    Processor::Resource(ResourceProcessor {
        attributes: vec![AttributeAction {
            action: "delete".to_string(),
            key: None,
            value: None,
            regex_pattern: Some("kyma.*".to_string()),
        }],
    })
}

pub fn istio_noise_filter() -> Processor {
    Processor::IstioNoiseFilter(IstioNoiseFilterProcessor {})
}

// ============================================================================
// Metric input filters
// ============================================================================

fn metric_filter(metric: Vec<String>) -> Processor {
    Processor::Filter(FilterProcessor {
        error_mode: ERROR_MODE_IGNORE.to_string(),
        metrics: Some(FilterProcessorMetrics {
            metric,
            datapoint: Vec::new(),
        }),
        ..Default::default()
    })
}

/// Drops everything produced by the given input source
pub fn drop_if_input_source(source: MetricInputSource) -> Processor {
    metric_filter(vec![ottl::input_source_equals(source)])
}

pub fn drop_envoy_metrics() -> Processor {
    metric_filter(vec![ottl::join_with_and(&[
        ottl::is_match("name", "^envoy_.*"),
        ottl::scope_name_equals(ottl::SCOPE_ISTIO),
    ])])
}

pub fn drop_runtime_metrics(resource: RuntimeResource) -> Processor {
    let regex = match resource {
        RuntimeResource::Pod => "^k8s.pod.*",
        RuntimeResource::Container => "(^k8s.container.*)|(^container.*)",
        RuntimeResource::Node => "^k8s.node.*",
        RuntimeResource::Volume => "^k8s.volume.*",
        RuntimeResource::Deployment => "^k8s.deployment.*",
        RuntimeResource::DaemonSet => "^k8s.daemonset.*",
        RuntimeResource::StatefulSet => "^k8s.statefulset.*",
        RuntimeResource::Job => "^k8s.job.*",
    };
    metric_filter(vec![ottl::join_with_and(&[
        ottl::input_source_equals(MetricInputSource::Runtime),
        ottl::is_match("name", regex),
    ])])
}

/// Drops the scrape bookkeeping metrics of a scraped source
pub fn drop_diagnostic_metrics(source: MetricInputSource) -> Processor {
    let names: Vec<String> = DIAGNOSTIC_METRIC_NAMES
        .iter()
        .map(|name| format!("name == \"{name}\""))
        .collect();
    metric_filter(vec![ottl::join_with_and(&[
        ottl::input_source_equals(source),
        ottl::join_with_or(&names),
    ])])
}

/// Log gateways only receive OTLP, so a disabled OTLP input drops every record
pub fn drop_all_logs() -> Processor {
    filter_for_signal(Signal::Logs, vec!["true".to_string()])
}

// ============================================================================
// Pipeline-specific processors
// ============================================================================

/// Namespace filter for one input; `None` without a non-empty selector
pub fn namespace_filter(
    signal: Signal,
    selector: Option<&NamespaceSelector>,
    source_guard: &str,
) -> Option<Processor> {
    let selector = selector.filter(|s| !s.is_empty())?;
    let predicates = ottl::namespace_selector_predicates(selector, source_guard);
    Some(filter_for_signal(signal, predicates))
}

pub fn user_defined_transform(signal: Signal, transforms: &[TransformSpec]) -> Option<Processor> {
    if transforms.is_empty() {
        return None;
    }

    let statements: Vec<TransformProcessorStatements> = transforms
        .iter()
        .map(|t| TransformProcessorStatements {
            statements: t.statements.clone(),
            conditions: t.conditions.clone(),
        })
        .collect();

    let mut processor = TransformProcessor {
        error_mode: ERROR_MODE_IGNORE.to_string(),
        ..Default::default()
    };
    match signal {
        Signal::Logs => processor.log_statements = statements,
        Signal::Metrics => processor.metric_statements = statements,
        Signal::Traces => processor.trace_statements = statements,
    }
    Some(Processor::Transform(processor))
}

/// User filter conditions; metric conditions apply to data points
pub fn user_defined_filter(signal: Signal, filters: &[FilterSpec]) -> Option<Processor> {
    let conditions: Vec<String> = filters
        .iter()
        .flat_map(|f| f.conditions.iter().cloned())
        .collect();
    if conditions.is_empty() {
        return None;
    }

    let processor = match signal {
        Signal::Metrics => FilterProcessor {
            error_mode: ERROR_MODE_IGNORE.to_string(),
            metrics: Some(FilterProcessorMetrics {
                metric: Vec::new(),
                datapoint: conditions,
            }),
            ..Default::default()
        },
        _ => return Some(filter_for_signal(signal, conditions)),
    };
    Some(Processor::Filter(processor))
}

fn filter_for_signal(signal: Signal, conditions: Vec<String>) -> Processor {
    let mut processor = FilterProcessor {
        error_mode: ERROR_MODE_IGNORE.to_string(),
        ..Default::default()
    };
    match signal {
        Signal::Metrics => {
            processor.metrics = Some(FilterProcessorMetrics {
                metric: conditions,
                datapoint: Vec::new(),
            })
        }
        Signal::Traces => processor.traces = Some(FilterProcessorTraces { span: conditions }),
        Signal::Logs => {
            processor.logs = Some(FilterProcessorLogs {
                log_record: conditions,
            })
        }
    }
    Processor::Filter(processor)
}

// ============================================================================
// Extensions and self-telemetry
// ============================================================================

pub fn health_check() -> Extension {
    Extension::Endpoint(Endpoint {
        endpoint: format!("{POD_IP_PLACEHOLDER}:13133"),
    })
}

pub fn pprof() -> Extension {
    Extension::Endpoint(Endpoint {
        endpoint: "127.0.0.1:1777".to_string(),
    })
}

pub fn k8s_leader_elector(namespace: &str) -> Extension {
    Extension::K8sLeaderElector(K8sLeaderElector {
        auth_type: "serviceAccount".to_string(),
        lease_name: LEADER_ELECTION_LEASE_NAME.to_string(),
        lease_namespace: namespace.to_string(),
    })
}

pub fn file_storage(directory: &str) -> Extension {
    Extension::FileStorage(FileStorage {
        directory: directory.to_string(),
    })
}

pub fn telemetry() -> Telemetry {
    Telemetry {
        metrics: TelemetryMetrics {
            readers: vec![MetricReader {
                pull: PullMetricReader {
                    exporter: PullExporter {
                        prometheus: PrometheusPullExporter {
                            host: POD_IP_PLACEHOLDER.to_string(),
                            port: 8888,
                        },
                    },
                },
            }],
        },
        logs: TelemetryLogs {
            level: "info".to_string(),
            encoding: "json".to_string(),
        },
    }
}
