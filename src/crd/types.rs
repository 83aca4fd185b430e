//! Shared types for the telemetry pipeline CRDs
//!
//! Output, authentication, TLS and selector types used by the metric, trace and
//! log pipeline resources.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A value given inline or read from a Kubernetes Secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValueType {
    /// Inline value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Reference to a key inside a Secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<ValueFromSource>,
}

impl ValueType {
    pub fn inline(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            value_from: None,
        }
    }

    pub fn from_secret(reference: SecretKeyRef) -> Self {
        Self {
            value: None,
            value_from: Some(ValueFromSource {
                secret_key_ref: Some(reference),
            }),
        }
    }

    /// Secret coordinate backing this value, if any
    pub fn secret_ref(&self) -> Option<&SecretKeyRef> {
        self.value_from.as_ref()?.secret_key_ref.as_ref()
    }

    /// True when neither an inline value nor a secret reference is set
    pub fn is_empty(&self) -> bool {
        self.value.as_deref().map_or(true, str::is_empty) && self.secret_ref().is_none()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValueFromSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeyRef>,
}

/// Coordinates of a single key inside a Kubernetes Secret
#[derive(
    Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub name: String,
    pub namespace: String,
    pub key: String,
}

impl SecretKeyRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for SecretKeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.namespace, self.name, self.key)
    }
}

/// Wire protocol of the OTLP output
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

/// OTLP backend the pipeline exports to
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OtlpOutput {
    #[serde(default)]
    pub protocol: OtlpProtocol,

    /// Backend endpoint, for example `https://backend:4317`
    pub endpoint: ValueType,

    /// Signal-specific path appended to the endpoint (HTTP only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationOptions>,

    /// Additional headers sent with every export request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutputTls>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic: Option<BasicAuthOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2: Option<OAuth2Options>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuthOptions {
    pub user: ValueType,
    pub password: ValueType,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2Options {
    pub token_url: ValueType,
    pub client_id: ValueType,
    pub client_secret: ValueType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,

    /// Extra form parameters sent to the token endpoint
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

/// A custom header; the value is prefixed with `prefix` and a space when set
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(flatten)]
    pub value: ValueType,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutputTls {
    /// Disable TLS entirely
    #[serde(default)]
    pub insecure: bool,

    /// Skip server certificate verification
    #[serde(default)]
    pub insecure_skip_verify: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<ValueType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<ValueType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<ValueType>,
}

/// Restricts an input to, or excludes it from, a set of namespaces
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl NamespaceSelector {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// OTTL transform statements applied under optional conditions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransformSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,

    #[serde(default)]
    pub statements: Vec<String>,
}

/// OTTL conditions; matching records are dropped
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    #[serde(default)]
    pub conditions: Vec<String>,
}

/// Status condition reported on pipeline resources
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Status shared by all pipeline resources
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl OtlpOutput {
    /// Checks shared by every pipeline kind
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("output.otlp.endpoint must be set".to_string());
        }

        if let Some(auth) = &self.authentication {
            if auth.basic.is_some() && auth.oauth2.is_some() {
                return Err(
                    "output.otlp.authentication must not set both basic and oauth2".to_string(),
                );
            }
            if let Some(basic) = &auth.basic {
                if basic.user.is_empty() || basic.password.is_empty() {
                    return Err(
                        "output.otlp.authentication.basic requires user and password".to_string(),
                    );
                }
            }
            if let Some(oauth2) = &auth.oauth2 {
                if oauth2.token_url.is_empty()
                    || oauth2.client_id.is_empty()
                    || oauth2.client_secret.is_empty()
                {
                    return Err(
                        "output.otlp.authentication.oauth2 requires tokenUrl, clientId and clientSecret"
                            .to_string(),
                    );
                }
            }
        }

        for header in &self.headers {
            if header.name.trim().is_empty() {
                return Err("output.otlp.headers entries must have a name".to_string());
            }
            if header.value.is_empty() {
                return Err(format!("output.otlp.headers[{}] has no value", header.name));
            }
        }

        if let Some(tls) = &self.tls {
            if tls.cert.is_some() != tls.key.is_some() {
                return Err("output.otlp.tls.cert and key must be set together".to_string());
            }
        }

        if self.path.is_some() && self.protocol == OtlpProtocol::Grpc {
            return Err("output.otlp.path is only supported with the http protocol".to_string());
        }

        Ok(())
    }
}

/// Rejects a selector that is present but lists no namespaces
pub(crate) fn validate_namespace_selector(
    field: &str,
    selector: Option<&NamespaceSelector>,
) -> Result<(), String> {
    match selector {
        Some(selector) if selector.is_empty() => Err(format!(
            "{field}.namespaces must list at least one include or exclude entry"
        )),
        _ => Ok(()),
    }
}
