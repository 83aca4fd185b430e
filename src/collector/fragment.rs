//! Per-pipeline configuration fragments
//!
//! A user pipeline compiles into a private [`Fragment`]: the components it
//! needs plus the service pipelines that reference them. Defining a component
//! and referencing it happen in one call, so a skipped (`None`) component can
//! never be referenced and a referenced one is always defined.

use std::collections::BTreeMap;

use tracing::debug;

use super::config::{
    Config, Connector, Exporter, Extension, Processor, Receiver, ServicePipeline,
};
use super::ids::{ComponentKind, ServicePipelineId};
use crate::error::{Error, Result};

/// Inserts `body` under `id`, accepting an identical existing body
pub(crate) fn define<T: PartialEq>(
    section: &mut BTreeMap<String, T>,
    kind: ComponentKind,
    id: &str,
    body: T,
) -> Result<()> {
    match section.get(id) {
        Some(existing) if *existing == body => Ok(()),
        Some(_) => Err(Error::ConsistencyViolation(format!(
            "{kind} {id} is defined twice with different bodies"
        ))),
        None => {
            section.insert(id.to_string(), body);
            Ok(())
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fragment {
    config: Config,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a service pipeline; nothing is recorded until [`PipelineAssembly::finish`]
    pub fn pipeline(&mut self, id: ServicePipelineId) -> PipelineAssembly<'_> {
        PipelineAssembly {
            fragment: self,
            id,
            pipeline: ServicePipeline::default(),
        }
    }

    /// Extensions are referenced from `service.extensions`, not from a pipeline
    pub fn extension(&mut self, id: &str, body: Extension) -> Result<()> {
        define(&mut self.config.extensions, ComponentKind::Extension, id, body)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Builder for one service pipeline of a fragment
pub struct PipelineAssembly<'f> {
    fragment: &'f mut Fragment,
    id: ServicePipelineId,
    pipeline: ServicePipeline,
}

impl<'f> PipelineAssembly<'f> {
    pub fn receiver(&mut self, id: &str, body: Receiver) -> Result<&mut Self> {
        define(
            &mut self.fragment.config.receivers,
            ComponentKind::Receiver,
            id,
            body,
        )?;
        push(&self.id, "receivers", &mut self.pipeline.receivers, id)?;
        Ok(self)
    }

    /// A connector consumed on the receiving side
    pub fn receiver_connector(&mut self, id: &str, body: Connector) -> Result<&mut Self> {
        define(
            &mut self.fragment.config.connectors,
            ComponentKind::Connector,
            id,
            body,
        )?;
        push(&self.id, "receivers", &mut self.pipeline.receivers, id)?;
        Ok(self)
    }

    /// Appends a processor; a `None` body is skipped entirely
    pub fn processor(&mut self, id: &str, body: Option<Processor>) -> Result<&mut Self> {
        let Some(body) = body else {
            return Ok(self);
        };
        define(
            &mut self.fragment.config.processors,
            ComponentKind::Processor,
            id,
            body,
        )?;
        push(&self.id, "processors", &mut self.pipeline.processors, id)?;
        debug!(pipeline = %self.id, processor = id, "Processor added");
        Ok(self)
    }

    pub fn exporter(&mut self, id: &str, body: Exporter) -> Result<&mut Self> {
        define(
            &mut self.fragment.config.exporters,
            ComponentKind::Exporter,
            id,
            body,
        )?;
        push(&self.id, "exporters", &mut self.pipeline.exporters, id)?;
        Ok(self)
    }

    /// A connector fed on the exporting side
    pub fn exporter_connector(&mut self, id: &str, body: Connector) -> Result<&mut Self> {
        define(
            &mut self.fragment.config.connectors,
            ComponentKind::Connector,
            id,
            body,
        )?;
        push(&self.id, "exporters", &mut self.pipeline.exporters, id)?;
        Ok(self)
    }

    /// Records the service pipeline in the fragment
    pub fn finish(self) -> Result<()> {
        let Self {
            fragment,
            id,
            pipeline,
        } = self;

        if pipeline.receivers.is_empty() || pipeline.exporters.is_empty() {
            return Err(Error::Internal(format!(
                "service pipeline {id} needs at least one receiver and one exporter"
            )));
        }

        let pipelines = &mut fragment.config.service.pipelines;
        match pipelines.get(&id) {
            Some(existing) if *existing == pipeline => Ok(()),
            Some(_) => Err(Error::ConsistencyViolation(format!(
                "service pipeline {id} is assembled twice with different components"
            ))),
            None => {
                pipelines.insert(id, pipeline);
                Ok(())
            }
        }
    }
}

fn push(pipeline: &ServicePipelineId, list: &str, ids: &mut Vec<String>, id: &str) -> Result<()> {
    if ids.iter().any(|existing| existing == id) {
        return Err(Error::Internal(format!(
            "{id} added twice to {list} of service pipeline {pipeline}"
        )));
    }
    ids.push(id.to_string());
    Ok(())
}
