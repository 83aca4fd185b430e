//! LogPipeline Custom Resource Definition
//!
//! Only the OTLP flavour of log pipelines is modelled here; the log agent
//! inputs are configured elsewhere.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    validate_namespace_selector, FilterSpec, NamespaceSelector, OtlpOutput, PipelineStatus,
    TransformSpec,
};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "telemetry.kyma-project.io",
    version = "v1alpha1",
    kind = "LogPipeline",
    status = "PipelineStatus",
    shortname = "lp",
    printcolumn = r#"{"name":"Configuration Generated","type":"string","jsonPath":".status.conditions[?(@.type=='ConfigurationGenerated')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LogPipelineSpec {
    #[serde(default)]
    pub input: LogPipelineInput,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterSpec>,

    pub output: LogPipelineOutput,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogPipelineInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp: Option<LogOtlpInput>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogOtlpInput {
    #[serde(default)]
    pub disabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<NamespaceSelector>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogPipelineOutput {
    pub otlp: OtlpOutput,
}

impl LogPipelineInput {
    pub fn is_otlp_enabled(&self) -> bool {
        self.otlp.as_ref().map_or(true, |o| !o.disabled)
    }

    pub fn otlp_namespaces(&self) -> Option<&NamespaceSelector> {
        if !self.is_otlp_enabled() {
            return None;
        }
        self.otlp.as_ref()?.namespaces.as_ref()
    }
}

impl LogPipelineSpec {
    pub fn validate(&self) -> Result<(), String> {
        self.output.otlp.validate()?;
        validate_namespace_selector("input.otlp", self.input.otlp_namespaces())?;
        if self.transforms.iter().any(|t| t.statements.is_empty()) {
            return Err("every transform must contain at least one statement".to_string());
        }
        if self.filters.iter().any(|f| f.conditions.is_empty()) {
            return Err("every filter must contain at least one condition".to_string());
        }
        Ok(())
    }
}
