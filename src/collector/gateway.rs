//! Shared build loop of the gateway builders
//!
//! Pipelines are processed in name order. Each resolves its exporter in its own
//! environment scope; a pipeline-scoped failure drops the scope and is reported
//! in [`BuildOutput::rejected`], any other failure aborts the build. The
//! accepted pipelines are then compiled into fragments and merged.

use std::collections::BTreeMap;

use kube::{Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::config::Config;
use super::env::{EnvBindings, EnvScope};
use super::fragment::Fragment;
use super::ids::Signal;
use super::merge::Merger;
use super::options::BuildOptions;
use super::otlp_exporter::{otlp_exporter, ExporterParts};
use super::secrets::{SecretContext, SecretResolver};
use crate::crd::OtlpOutput;
use crate::error::{Error, RejectedPipeline, Result};

/// Result of one gateway build
#[derive(Debug)]
pub struct BuildOutput {
    pub config: Config,
    /// Values behind every `${NAME}` placeholder of `config`
    pub env: EnvBindings,
    /// Pipelines left out of `config`, in name order
    pub rejected: Vec<RejectedPipeline>,
}

impl BuildOutput {
    /// Composite error naming every rejected pipeline, `None` when all were accepted
    pub fn partial_failure(&self) -> Option<Error> {
        if self.rejected.is_empty() {
            None
        } else {
            Some(Error::PartialFailure(self.rejected.clone()))
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        self.config.to_yaml()
    }
}

/// Adds the OAuth2 extension an exporter authenticates with, if any
pub(crate) fn take_oauth2(fragment: &mut Fragment, parts: &mut ExporterParts) -> Result<()> {
    if let Some((id, extension)) = parts.oauth2.take() {
        fragment.extension(&id, extension)?;
    }
    Ok(())
}

/// Signal-specific half of a gateway build
pub(crate) trait GatewayCompiler: Send + Sync {
    type Pipeline: Resource + Send + Sync;

    const SIGNAL: Signal;

    fn validate(pipeline: &Self::Pipeline) -> std::result::Result<(), String>;

    fn output(pipeline: &Self::Pipeline) -> &OtlpOutput;

    /// Assembles the fragment of an accepted pipeline around its resolved exporter
    fn compile(
        &self,
        name: &str,
        pipeline: &Self::Pipeline,
        exporter: ExporterParts,
    ) -> Result<Fragment>;
}

/// Sorts, deduplicates and validates the input, then compiles every survivor
///
/// Exporters are resolved first since every secret lookup happens there. Only
/// then is the accepted set known, and `prepare` builds the compiler from it,
/// so set-wide decisions and the queue split ignore every rejected pipeline.
#[instrument(skip_all, fields(signal = %C::SIGNAL, pipelines = pipelines.len()))]
pub(crate) async fn build<C, F>(
    cancel: &CancellationToken,
    resolver: &dyn SecretResolver,
    options: &BuildOptions,
    pipelines: &[C::Pipeline],
    prepare: F,
) -> Result<BuildOutput>
where
    C: GatewayCompiler,
    F: FnOnce(&[&C::Pipeline]) -> C,
{
    options.validate().map_err(Error::ConfigError)?;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let mut by_name: BTreeMap<String, Vec<&C::Pipeline>> = BTreeMap::new();
    for pipeline in pipelines {
        by_name.entry(pipeline.name_any()).or_default().push(pipeline);
    }

    let mut rejected = Vec::new();
    let mut candidates = Vec::with_capacity(by_name.len());
    for (name, group) in by_name {
        if name.is_empty() {
            rejected.push(RejectedPipeline {
                name,
                reason: "pipeline has no name".to_string(),
            });
        } else if group.len() > 1 {
            rejected.push(RejectedPipeline {
                name,
                reason: format!("name is used by {} pipelines", group.len()),
            });
        } else {
            candidates.push((name, group[0]));
        }
    }

    let mut valid = Vec::with_capacity(candidates.len());
    for (name, pipeline) in candidates {
        match C::validate(pipeline) {
            Ok(()) => valid.push((name, pipeline)),
            Err(reason) => rejected.push(RejectedPipeline { name, reason }),
        }
    }

    let mut env = EnvBindings::default();
    let mut accepted = Vec::with_capacity(valid.len());

    for (name, pipeline) in valid {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let resolved = {
            let secrets = SecretContext::new(cancel, resolver, &name);
            let mut scope = EnvScope::new(&env);
            otlp_exporter(&secrets, &mut scope, C::SIGNAL, C::output(pipeline), options)
                .await
                .map(|exporter| (exporter, scope.finish()))
        };

        match resolved {
            Ok((exporter, bindings)) => {
                debug!(pipeline = %name, bindings = bindings.len(), "Pipeline exporter resolved");
                env.absorb(bindings);
                accepted.push((name, pipeline, exporter));
            }
            Err(e) if e.is_pipeline_scoped() => {
                warn!(pipeline = %name, error = %e, "Pipeline rejected");
                rejected.push(RejectedPipeline {
                    name,
                    reason: rejection_reason(&e),
                });
            }
            Err(e) => return Err(e),
        }
    }

    let compiler = prepare(&accepted.iter().map(|(_, p, _)| *p).collect::<Vec<_>>());
    let queue_size = options.queue_size_per_pipeline(accepted.len());
    let mut merger = Merger::new();

    for (name, pipeline, mut exporter) in accepted {
        exporter.set_queue_size(queue_size);
        let fragment = compiler.compile(&name, pipeline, exporter)?;
        debug!(pipeline = %name, "Pipeline compiled");
        merger.merge(fragment.into_config())?;
    }

    rejected.sort_by(|a, b| a.name.cmp(&b.name));

    let merger_fragments = merger.fragments();
    let config = merger.finish(C::SIGNAL, options)?;

    info!(
        accepted = merger_fragments,
        rejected = rejected.len(),
        env = env.len(),
        "Collector configuration built"
    );

    Ok(BuildOutput {
        config,
        env,
        rejected,
    })
}

fn rejection_reason(error: &Error) -> String {
    match error {
        Error::InputInvalid { reason, .. } => reason.clone(),
        Error::SecretUnresolvable {
            reference, reason, ..
        } => format!("secret {reference}: {reason}"),
        other => other.to_string(),
    }
}
