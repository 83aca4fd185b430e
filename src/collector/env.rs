//! Environment-variable bindings
//!
//! Sensitive or user-supplied values never appear in the configuration
//! document. The document carries `${NAME}` placeholders and each placeholder
//! has a binding that records where its value came from and which field
//! references it. The deployment layer materialises the bindings as a Secret.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::ByteString;
use once_cell::sync::Lazy;
use regex::Regex;

use super::ids::Signal;
use crate::crd::SecretKeyRef;

static INVALID_ENV_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Z0-9_]").expect("static regex is valid"));

/// Upper-cases a pipeline name and replaces anything outside `[A-Z0-9_]` with `_`
pub fn sanitize_env_name(name: &str) -> String {
    INVALID_ENV_CHARS
        .replace_all(&name.to_uppercase(), "_")
        .into_owned()
}

/// `PREFIX_PIPELINE`, the base name before collision handling
pub fn env_key(prefix: &str, pipeline: &str) -> String {
    format!("{prefix}_{}", sanitize_env_name(pipeline))
}

/// A resolved value; `Debug` never prints the content
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SecretValue(Vec<u8>);

impl SecretValue {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue([REDACTED; {} bytes])", self.0.len())
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

/// Where part of a bound value came from
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueSource {
    Inline,
    Secret(SecretKeyRef),
}

/// Field of a component body that references a placeholder
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    /// Collector (by signal) whose configuration contains the field
    pub signal: Signal,
    /// Dotted path, e.g. `exporters.otlp/p1.headers.Authorization`
    pub path: String,
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.signal, self.path)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnvBinding {
    pub name: String,
    pub pipeline: String,
    pub sources: Vec<ValueSource>,
    pub target: FieldPath,
    pub value: SecretValue,
}

impl EnvBinding {
    /// `${NAME}`, the form used inside the document
    pub fn placeholder(&self) -> String {
        placeholder(&self.name)
    }

    /// Secret coordinates the value was read from
    pub fn secret_refs(&self) -> impl Iterator<Item = &SecretKeyRef> {
        self.sources.iter().filter_map(|s| match s {
            ValueSource::Secret(r) => Some(r),
            ValueSource::Inline => None,
        })
    }
}

pub(crate) fn placeholder(name: &str) -> String {
    format!("${{{name}}}")
}

/// All bindings of a document, keyed by variable name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvBindings {
    bindings: BTreeMap<String, EnvBinding>,
}

impl EnvBindings {
    pub fn get(&self, name: &str) -> Option<&EnvBinding> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnvBinding> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings of one pipeline, in name order
    pub fn for_pipeline<'a>(&'a self, pipeline: &'a str) -> impl Iterator<Item = &'a EnvBinding> {
        self.bindings.values().filter(move |b| b.pipeline == pipeline)
    }

    /// Secret `data` for the collector's environment
    pub fn to_secret_data(&self) -> BTreeMap<String, ByteString> {
        self.bindings
            .iter()
            .map(|(name, b)| (name.clone(), ByteString(b.value.expose().to_vec())))
            .collect()
    }

    /// Adds the bindings of a compiled pipeline; names are unique by construction
    pub(crate) fn absorb(&mut self, bindings: Vec<EnvBinding>) {
        self.bindings
            .extend(bindings.into_iter().map(|b| (b.name.clone(), b)));
    }
}

/// Name allocation for one pipeline compile
///
/// Names taken by already accepted pipelines are visible but not writable; a
/// rejected pipeline's scope is dropped together with its names.
pub struct EnvScope<'a> {
    taken: &'a EnvBindings,
    local: BTreeMap<String, EnvBinding>,
}

impl<'a> EnvScope<'a> {
    pub(crate) fn new(taken: &'a EnvBindings) -> Self {
        Self {
            taken,
            local: BTreeMap::new(),
        }
    }

    fn is_free(&self, name: &str) -> bool {
        !self.taken.contains(name) && !self.local.contains_key(name)
    }

    /// First free name among `base`, `base_2`, `base_3`, ...
    fn allocate(&self, base: &str) -> String {
        if self.is_free(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| self.is_free(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Registers a value and returns its placeholder
    pub(crate) fn bind(
        &mut self,
        base: &str,
        pipeline: &str,
        sources: Vec<ValueSource>,
        target: FieldPath,
        value: SecretValue,
    ) -> String {
        let name = self.allocate(base);
        let binding = EnvBinding {
            name: name.clone(),
            pipeline: pipeline.to_string(),
            sources,
            target,
            value,
        };
        self.local.insert(name.clone(), binding);
        placeholder(&name)
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Releases the borrow of the accepted set and hands back the new bindings
    pub(crate) fn finish(self) -> Vec<EnvBinding> {
        self.local.into_values().collect()
    }
}
