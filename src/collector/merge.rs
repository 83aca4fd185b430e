//! Fragment merging and document validation

use std::collections::BTreeSet;

use tracing::debug;

use super::components;
use super::config::{Config, Exporter};
use super::fragment::define;
use super::ids::{ComponentKind, Signal, StaticId};
use super::options::BuildOptions;
use crate::error::{Error, Result};

/// Accumulates accepted fragments into one document
#[derive(Debug, Default)]
pub struct Merger {
    config: Config,
    fragments: usize,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a fragment in; shared IDs must carry identical bodies
    pub fn merge(&mut self, fragment: Config) -> Result<()> {
        let Config {
            extensions,
            receivers,
            processors,
            exporters,
            connectors,
            service,
        } = fragment;

        for (id, body) in extensions {
            define(&mut self.config.extensions, ComponentKind::Extension, &id, body)?;
        }
        for (id, body) in receivers {
            define(&mut self.config.receivers, ComponentKind::Receiver, &id, body)?;
        }
        for (id, body) in processors {
            define(&mut self.config.processors, ComponentKind::Processor, &id, body)?;
        }
        for (id, body) in exporters {
            define(&mut self.config.exporters, ComponentKind::Exporter, &id, body)?;
        }
        for (id, body) in connectors {
            define(&mut self.config.connectors, ComponentKind::Connector, &id, body)?;
        }

        for (id, pipeline) in service.pipelines {
            match self.config.service.pipelines.get(&id) {
                Some(existing) if *existing == pipeline => {}
                Some(_) => {
                    return Err(Error::ConsistencyViolation(format!(
                        "service pipeline {id} differs between pipelines"
                    )))
                }
                None => {
                    self.config.service.pipelines.insert(id, pipeline);
                }
            }
        }

        self.fragments += 1;
        Ok(())
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Adds the base extensions and self-telemetry, then validates the document
    pub fn finish(mut self, signal: Signal, options: &BuildOptions) -> Result<Config> {
        let extensions = &mut self.config.extensions;
        define(
            extensions,
            ComponentKind::Extension,
            StaticId::HealthCheck.as_str(),
            components::health_check(),
        )?;
        define(
            extensions,
            ComponentKind::Extension,
            StaticId::Pprof.as_str(),
            components::pprof(),
        )?;

        // Only the metric gateway runs the kyma-stats receiver that needs a lease
        if signal == Signal::Metrics {
            if let Some(namespace) = options.leader_election_namespace.as_deref() {
                define(
                    extensions,
                    ComponentKind::Extension,
                    StaticId::K8sLeaderElector.as_str(),
                    components::k8s_leader_elector(namespace),
                )?;
            }
        }

        if let Some(directory) = options.file_storage_directory.as_deref() {
            define(
                extensions,
                ComponentKind::Extension,
                StaticId::FileStorage.as_str(),
                components::file_storage(directory),
            )?;
        }

        self.config.service.extensions = self.config.extensions.keys().cloned().collect();
        self.config.service.telemetry = Some(components::telemetry());

        validate(&self.config)?;

        debug!(
            fragments = self.fragments,
            pipelines = self.config.service.pipelines.len(),
            "Configuration merged"
        );
        Ok(self.config)
    }
}

/// Checks reference closure and the absence of orphaned components
pub fn validate(config: &Config) -> Result<()> {
    let mut used_receivers = BTreeSet::new();
    let mut used_processors = BTreeSet::new();
    let mut used_exporters = BTreeSet::new();

    for (pipeline_id, pipeline) in &config.service.pipelines {
        for id in &pipeline.receivers {
            if !config.receivers.contains_key(id) && !config.connectors.contains_key(id) {
                return Err(dangling(&pipeline_id.to_string(), ComponentKind::Receiver, id));
            }
            used_receivers.insert(id.as_str());
        }
        for id in &pipeline.processors {
            if !config.processors.contains_key(id) {
                return Err(dangling(&pipeline_id.to_string(), ComponentKind::Processor, id));
            }
            used_processors.insert(id.as_str());
        }
        for id in &pipeline.exporters {
            if !config.exporters.contains_key(id) && !config.connectors.contains_key(id) {
                return Err(dangling(&pipeline_id.to_string(), ComponentKind::Exporter, id));
            }
            used_exporters.insert(id.as_str());
        }
    }

    for id in &config.service.extensions {
        if !config.extensions.contains_key(id) {
            return Err(dangling("service", ComponentKind::Extension, id));
        }
    }

    for (exporter_id, exporter) in &config.exporters {
        let Exporter::Otlp(otlp) = exporter;
        if let Some(auth) = &otlp.auth {
            if !config.service.extensions.contains(&auth.authenticator) {
                return Err(dangling(exporter_id, ComponentKind::Extension, &auth.authenticator));
            }
        }
        if let Some(storage) = &otlp.sending_queue.storage {
            if !config.service.extensions.contains(storage) {
                return Err(dangling(exporter_id, ComponentKind::Extension, storage));
            }
        }
    }

    orphans(config.receivers.keys(), &used_receivers, ComponentKind::Receiver)?;
    orphans(config.processors.keys(), &used_processors, ComponentKind::Processor)?;
    orphans(config.exporters.keys(), &used_exporters, ComponentKind::Exporter)?;

    for id in config.connectors.keys() {
        if !used_exporters.contains(id.as_str()) || !used_receivers.contains(id.as_str()) {
            return Err(Error::ConsistencyViolation(format!(
                "connector {id} must be both exported to and received from"
            )));
        }
    }

    for id in config.extensions.keys() {
        if !config.service.extensions.contains(id) {
            return Err(Error::ConsistencyViolation(format!(
                "extension {id} is not enabled in service.extensions"
            )));
        }
    }

    Ok(())
}

fn dangling(owner: &str, kind: ComponentKind, id: &str) -> Error {
    Error::ConsistencyViolation(format!("{owner} references undefined {kind} {id}"))
}

fn orphans<'a>(
    defined: impl Iterator<Item = &'a String>,
    used: &BTreeSet<&str>,
    kind: ComponentKind,
) -> Result<()> {
    for id in defined {
        if !used.contains(id.as_str()) {
            return Err(Error::ConsistencyViolation(format!(
                "{kind} {id} is defined but never referenced"
            )));
        }
    }
    Ok(())
}
