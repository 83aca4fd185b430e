//! Secret resolution
//!
//! The builder reads credentials through [`SecretResolver`]. Lookups honour the
//! caller's cancellation token and are never retried here; the reconciler
//! retries whole reconciliations.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{api::Api, client::Client};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::env::{SecretValue, ValueSource};
use crate::crd::{SecretKeyRef, ValueType};
use crate::error::{Error, Result};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("secret key not found")]
    NotFound,

    #[error("access to secret forbidden")]
    Forbidden,

    #[error("lookup cancelled")]
    Cancelled,

    #[error("transient lookup failure: {0}")]
    Transient(String),
}

#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Reads one key of a secret
    async fn resolve(
        &self,
        cancel: &CancellationToken,
        reference: &SecretKeyRef,
    ) -> std::result::Result<SecretValue, ResolveError>;
}

/// Resolver backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretResolver {
    client: Client,
}

impl KubeSecretResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretResolver for KubeSecretResolver {
    #[instrument(skip(self, cancel), fields(secret = %reference))]
    async fn resolve(
        &self,
        cancel: &CancellationToken,
        reference: &SecretKeyRef,
    ) -> std::result::Result<SecretValue, ResolveError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &reference.namespace);

        let secret = tokio::select! {
            _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
            result = api.get(&reference.name) => result,
        };

        secret
            .map_err(lookup_error)?
            .data
            .and_then(|mut data| data.remove(&reference.key))
            .map(|bytes| SecretValue::new(bytes.0))
            .ok_or(ResolveError::NotFound)
    }
}

/// Only a missing or forbidden secret is the pipeline's fault; every other API
/// failure is transient
fn lookup_error(error: kube::Error) -> ResolveError {
    match error {
        kube::Error::Api(e) if e.code == 404 => ResolveError::NotFound,
        kube::Error::Api(e) if e.code == 403 => ResolveError::Forbidden,
        e => ResolveError::Transient(e.to_string()),
    }
}

/// In-memory resolver for dry runs and tests
#[derive(Clone, Debug, Default)]
pub struct StaticSecretResolver {
    values: BTreeMap<SecretKeyRef, SecretValue>,
    forbidden: BTreeSet<SecretKeyRef>,
}

impl StaticSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: SecretKeyRef, value: impl Into<Vec<u8>>) -> Self {
        self.insert(reference, value);
        self
    }

    pub fn insert(&mut self, reference: SecretKeyRef, value: impl Into<Vec<u8>>) {
        self.values.insert(reference, SecretValue::new(value));
    }

    /// Makes lookups of `reference` fail as if RBAC denied them
    pub fn forbid(mut self, reference: SecretKeyRef) -> Self {
        self.forbidden.insert(reference);
        self
    }
}

#[async_trait]
impl SecretResolver for StaticSecretResolver {
    async fn resolve(
        &self,
        cancel: &CancellationToken,
        reference: &SecretKeyRef,
    ) -> std::result::Result<SecretValue, ResolveError> {
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        if self.forbidden.contains(reference) {
            return Err(ResolveError::Forbidden);
        }
        self.values
            .get(reference)
            .cloned()
            .ok_or(ResolveError::NotFound)
    }
}

/// Resolution on behalf of one pipeline
///
/// Maps resolver failures onto the builder's error taxonomy: missing or
/// forbidden secrets reject the pipeline, cancellation and backend failures
/// abort the build.
pub(crate) struct SecretContext<'a> {
    cancel: &'a CancellationToken,
    resolver: &'a dyn SecretResolver,
    pipeline: &'a str,
}

impl<'a> SecretContext<'a> {
    pub(crate) fn new(
        cancel: &'a CancellationToken,
        resolver: &'a dyn SecretResolver,
        pipeline: &'a str,
    ) -> Self {
        Self {
            cancel,
            resolver,
            pipeline,
        }
    }

    pub(crate) fn pipeline(&self) -> &str {
        self.pipeline
    }

    /// Resolves an inline or secret-backed value; a non-empty inline value wins
    pub(crate) async fn value(&self, value: &ValueType) -> Result<(SecretValue, ValueSource)> {
        if let Some(inline) = value.value.as_deref().filter(|v| !v.is_empty()) {
            return Ok((SecretValue::from(inline), ValueSource::Inline));
        }

        match value.secret_ref() {
            Some(reference) => {
                let resolved = self.secret(reference).await?;
                Ok((resolved, ValueSource::Secret(reference.clone())))
            }
            None => Err(Error::InputInvalid {
                pipeline: self.pipeline.to_string(),
                reason: "value must be set inline or through valueFrom.secretKeyRef".to_string(),
            }),
        }
    }

    /// Resolves a value that has to be valid UTF-8 text
    pub(crate) async fn text(&self, value: &ValueType) -> Result<(String, ValueSource)> {
        let (resolved, source) = self.value(value).await?;
        let text = String::from_utf8(resolved.expose().to_vec()).map_err(|_| {
            Error::InputInvalid {
                pipeline: self.pipeline.to_string(),
                reason: match &source {
                    ValueSource::Secret(r) => format!("secret {r} is not valid UTF-8"),
                    ValueSource::Inline => "inline value is not valid UTF-8".to_string(),
                },
            }
        })?;
        Ok((text, source))
    }

    async fn secret(&self, reference: &SecretKeyRef) -> Result<SecretValue> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        debug!(pipeline = self.pipeline, secret = %reference, "Resolving secret");

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(ResolveError::Cancelled),
            result = self.resolver.resolve(self.cancel, reference) => result,
        };

        result.map_err(|e| self.map_error(reference, e))
    }

    fn map_error(&self, reference: &SecretKeyRef, error: ResolveError) -> Error {
        match error {
            ResolveError::NotFound | ResolveError::Forbidden => Error::SecretUnresolvable {
                pipeline: self.pipeline.to_string(),
                reference: reference.clone(),
                reason: error.to_string(),
            },
            ResolveError::Cancelled => Error::Cancelled,
            ResolveError::Transient(message) => Error::SecretBackend {
                reference: reference.clone(),
                message,
            },
        }
    }
}
