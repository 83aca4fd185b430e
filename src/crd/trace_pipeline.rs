//! TracePipeline Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{FilterSpec, OtlpOutput, PipelineStatus, TransformSpec};

/// The TracePipeline CRD ships spans received over OTLP to one backend.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "telemetry.kyma-project.io",
    version = "v1alpha1",
    kind = "TracePipeline",
    status = "PipelineStatus",
    shortname = "tp",
    printcolumn = r#"{"name":"Configuration Generated","type":"string","jsonPath":".status.conditions[?(@.type=='ConfigurationGenerated')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TracePipelineSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterSpec>,

    pub output: TracePipelineOutput,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TracePipelineOutput {
    pub otlp: OtlpOutput,
}

impl TracePipelineSpec {
    pub fn validate(&self) -> Result<(), String> {
        self.output.otlp.validate()?;
        if self.transforms.iter().any(|t| t.statements.is_empty()) {
            return Err("every transform must contain at least one statement".to_string());
        }
        if self.filters.iter().any(|f| f.conditions.is_empty()) {
            return Err("every filter must contain at least one condition".to_string());
        }
        Ok(())
    }
}
