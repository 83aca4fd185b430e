//! Builder options
//!
//! Cluster-wide settings the operator passes to every build. The struct
//! deserialises from the operator's configuration (camelCase keys) and falls
//! back to defaults for anything left out.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    /// Total exporter queue capacity, split evenly across pipelines
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    #[serde(default)]
    pub cluster: ClusterInfo,

    #[serde(default)]
    pub enrichments: Enrichments,

    /// Namespace of the lease used by the k8s_leader_elector extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_election_namespace: Option<String>,

    /// Directory for persistent exporter queues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_storage_directory: Option<String>,

    /// Passed through to the deployment layer, never read by the builder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_version: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub uid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Enrichments {
    /// Pod labels copied onto resource attributes as `k8s.pod.label.<key>`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extract_pod_labels: Vec<PodLabel>,
}

/// Exact label key or key prefix; `key_prefix` wins when both are set
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodLabel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
}

fn default_max_queue_size() -> usize {
    256
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            cluster: ClusterInfo::default(),
            enrichments: Enrichments::default(),
            leader_election_namespace: None,
            file_storage_directory: None,
            module_version: None,
        }
    }
}

impl BuildOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_queue_size == 0 {
            return Err("maxQueueSize must be at least 1".to_string());
        }

        for (i, label) in self.enrichments.extract_pod_labels.iter().enumerate() {
            let key = label.key.as_deref().unwrap_or_default();
            let prefix = label.key_prefix.as_deref().unwrap_or_default();
            if key.is_empty() && prefix.is_empty() {
                return Err(format!(
                    "enrichments.extractPodLabels[{i}] needs key or keyPrefix"
                ));
            }
        }

        if matches!(self.leader_election_namespace.as_deref(), Some("")) {
            return Err("leaderElectionNamespace must not be empty".to_string());
        }

        if matches!(self.file_storage_directory.as_deref(), Some("")) {
            return Err("fileStorageDirectory must not be empty".to_string());
        }

        Ok(())
    }

    /// Per-pipeline exporter queue size; never below one
    pub fn queue_size_per_pipeline(&self, pipelines: usize) -> usize {
        (self.max_queue_size / pipelines.max(1)).max(1)
    }
}
