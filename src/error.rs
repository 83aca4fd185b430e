//! Error types for the telemetry operator

use std::fmt;

use thiserror::Error;

use crate::crd::SecretKeyRef;

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A single pipeline violates a precondition of the builder
    #[error("pipeline {pipeline} is invalid: {reason}")]
    InputInvalid { pipeline: String, reason: String },

    /// A secret referenced by a pipeline does not exist or cannot be read
    #[error("pipeline {pipeline} references unresolvable secret {reference}: {reason}")]
    SecretUnresolvable {
        pipeline: String,
        reference: SecretKeyRef,
        reason: String,
    },

    /// The secret backend failed in a way that should be retried
    #[error("secret backend failed for {reference}: {message}")]
    SecretBackend {
        reference: SecretKeyRef,
        message: String,
    },

    /// One or more pipelines were rejected while the rest were emitted
    #[error("{} pipeline(s) rejected: {}", .0.len(), RejectedList(.0))]
    PartialFailure(Vec<RejectedPipeline>),

    /// The merged document would reference missing components or disagree on a shared ID
    #[error("configuration consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("build cancelled")]
    Cancelled,

    #[error("internal builder error: {0}")]
    Internal(String),
}

impl Error {
    /// Per-pipeline errors are collected, everything else aborts the build
    pub fn is_pipeline_scoped(&self) -> bool {
        matches!(
            self,
            Error::InputInvalid { .. } | Error::SecretUnresolvable { .. }
        )
    }

    /// Name of the pipeline a scoped error belongs to
    pub fn pipeline(&self) -> Option<&str> {
        match self {
            Error::InputInvalid { pipeline, .. } | Error::SecretUnresolvable { pipeline, .. } => {
                Some(pipeline)
            }
            _ => None,
        }
    }
}

/// A pipeline that was left out of the generated configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPipeline {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for RejectedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.reason)
    }
}

struct RejectedList<'a>(&'a [RejectedPipeline]);

impl fmt::Display for RejectedList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rejected) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{rejected}")?;
        }
        Ok(())
    }
}
