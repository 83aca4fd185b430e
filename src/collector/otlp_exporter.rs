//! OTLP exporter and OAuth2 client extension
//!
//! Every user-supplied value (endpoint, credentials, headers, PEM material) is
//! bound to an environment variable and the exporter body only carries the
//! `${NAME}` placeholder.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;
use url::Url;

use super::config::{
    Exporter, ExporterAuth, Extension, OAuth2Extension, OtlpExporter, RetryOnFailure,
    SendingQueue, TlsConfig,
};
use super::env::{env_key, sanitize_env_name, EnvScope, FieldPath, SecretValue, ValueSource};
use super::ids::{exporter_id, pipeline_id, PipelineTemplate, Signal, StaticId};
use super::options::BuildOptions;
use super::secrets::SecretContext;
use crate::crd::{BasicAuthOptions, OAuth2Options, OtlpOutput, OtlpProtocol, OutputTls, ValueType};
use crate::error::{Error, Result};

const OTLP_ENDPOINT: &str = "OTLP_ENDPOINT";
const BASIC_AUTH_HEADER: &str = "BASIC_AUTH_HEADER";
const TLS_CA_PEM: &str = "OTLP_TLS_CA_PEM";
const TLS_CERT_PEM: &str = "OTLP_TLS_CERT_PEM";
const TLS_KEY_PEM: &str = "OTLP_TLS_KEY_PEM";
const OAUTH2_TOKEN_URL: &str = "OAUTH2_TOKEN_URL";
const OAUTH2_CLIENT_ID: &str = "OAUTH2_CLIENT_ID";
const OAUTH2_CLIENT_SECRET: &str = "OAUTH2_CLIENT_SECRET";

const AUTHORIZATION_HEADER: &str = "Authorization";

/// The exporter of one pipeline plus the extension it authenticates with
#[derive(Debug)]
pub(crate) struct ExporterParts {
    pub id: String,
    pub exporter: Exporter,
    pub oauth2: Option<(String, Extension)>,
}

impl ExporterParts {
    /// Sets the exporter's share of the gateway queue
    pub fn set_queue_size(&mut self, queue_size: usize) {
        let Exporter::Otlp(exporter) = &mut self.exporter;
        exporter.sending_queue.queue_size = queue_size;
    }
}

/// Builds `otlp/<p>` (or `otlphttp/<p>`) and binds its values
///
/// The sending queue starts at the full `max_queue_size`; the gateway splits
/// it once the set of accepted pipelines is known.
pub(crate) async fn otlp_exporter(
    secrets: &SecretContext<'_>,
    env: &mut EnvScope<'_>,
    signal: Signal,
    output: &OtlpOutput,
    options: &BuildOptions,
) -> Result<ExporterParts> {
    let pipeline = secrets.pipeline().to_string();
    let id = exporter_id(output.protocol, &pipeline);
    let mut binder = Binder {
        env,
        pipeline: &pipeline,
        signal,
        component: format!("exporters.{id}"),
    };

    let mut exporter = OtlpExporter {
        sending_queue: SendingQueue {
            enabled: true,
            queue_size: options.max_queue_size,
            storage: options
                .file_storage_directory
                .as_ref()
                .map(|_| StaticId::FileStorage.as_str().to_string()),
        },
        retry_on_failure: RetryOnFailure {
            enabled: true,
            initial_interval: "5s".to_string(),
            max_interval: "30s".to_string(),
            max_elapsed_time: "300s".to_string(),
        },
        ..Default::default()
    };

    let (endpoint, endpoint_source) = secrets.text(&output.endpoint).await?;
    let insecure_scheme = Url::parse(&endpoint).is_ok_and(|u| u.scheme() == "http");

    match output.path.as_deref().filter(|p| !p.is_empty()) {
        Some(path) if output.protocol == OtlpProtocol::Http => {
            let joined = join_path(&endpoint, path).ok_or_else(|| Error::InputInvalid {
                pipeline: pipeline.clone(),
                reason: "output.otlp.endpoint is not a valid URL and cannot be joined with path"
                    .to_string(),
            })?;
            let field = match signal {
                Signal::Metrics => "metrics_endpoint",
                Signal::Traces => "traces_endpoint",
                Signal::Logs => "logs_endpoint",
            };
            let placeholder = binder.bind(
                &env_key(OTLP_ENDPOINT, &pipeline),
                field,
                vec![endpoint_source],
                SecretValue::from(joined.as_str()),
            );
            match signal {
                Signal::Metrics => exporter.metrics_endpoint = Some(placeholder),
                Signal::Traces => exporter.traces_endpoint = Some(placeholder),
                Signal::Logs => exporter.logs_endpoint = Some(placeholder),
            }
        }
        _ => {
            let placeholder = binder.bind(
                &env_key(OTLP_ENDPOINT, &pipeline),
                "endpoint",
                vec![endpoint_source],
                SecretValue::from(endpoint.as_str()),
            );
            exporter.endpoint = Some(placeholder);
        }
    }

    let authentication = output.authentication.as_ref();

    if let Some(basic) = authentication.and_then(|a| a.basic.as_ref()) {
        let placeholder = basic_auth_header(secrets, &mut binder, basic).await?;
        exporter
            .headers
            .insert(AUTHORIZATION_HEADER.to_string(), placeholder);
    }

    for header in &output.headers {
        let name = header.name.trim();
        if exporter
            .headers
            .keys()
            .any(|existing| existing.eq_ignore_ascii_case(name))
        {
            return Err(Error::InputInvalid {
                pipeline: pipeline.clone(),
                reason: format!("header {name} is set more than once"),
            });
        }

        let (value, source) = secrets.value(&header.value).await?;
        let value = match header.prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => {
                let mut prefixed = format!("{prefix} ").into_bytes();
                prefixed.extend_from_slice(value.expose());
                SecretValue::new(prefixed)
            }
            _ => value,
        };
        let base = format!(
            "{}_{}",
            env_key("HEADER", &pipeline),
            sanitize_env_name(name)
        );
        let placeholder = binder.bind(&base, &format!("headers.{name}"), vec![source], value);
        exporter.headers.insert(name.to_string(), placeholder);
    }

    exporter.tls = tls_config(secrets, &mut binder, output.tls.as_ref(), insecure_scheme).await?;

    let oauth2 = match authentication.and_then(|a| a.oauth2.as_ref()) {
        Some(oauth2) => {
            let extension_id = pipeline_id(PipelineTemplate::OAuth2Extension, &pipeline);
            // The extension is always bound for the trace signal, whichever gateway builds it.
            // TODO: pass `signal` once the deployment layer reads bindings per gateway signal.
            let extension = oauth2_extension(secrets, binder.env, Signal::Traces, oauth2).await?;
            exporter.auth = Some(ExporterAuth {
                authenticator: extension_id.clone(),
            });
            Some((extension_id, extension))
        }
        None => None,
    };

    debug!(pipeline = %pipeline, exporter = %id, "OTLP exporter built");

    Ok(ExporterParts {
        id,
        exporter: Exporter::Otlp(exporter),
        oauth2,
    })
}

/// `oauth2client/<p>` with its credentials behind placeholders
pub(crate) async fn oauth2_extension(
    secrets: &SecretContext<'_>,
    env: &mut EnvScope<'_>,
    signal: Signal,
    oauth2: &OAuth2Options,
) -> Result<Extension> {
    let pipeline = secrets.pipeline().to_string();
    let id = pipeline_id(PipelineTemplate::OAuth2Extension, &pipeline);
    let mut binder = Binder {
        env,
        pipeline: &pipeline,
        signal,
        component: format!("extensions.{id}"),
    };

    let token_url = bind_value(
        secrets,
        &mut binder,
        OAUTH2_TOKEN_URL,
        "token_url",
        &oauth2.token_url,
    )
    .await?;
    let client_id = bind_value(
        secrets,
        &mut binder,
        OAUTH2_CLIENT_ID,
        "client_id",
        &oauth2.client_id,
    )
    .await?;
    let client_secret = bind_value(
        secrets,
        &mut binder,
        OAUTH2_CLIENT_SECRET,
        "client_secret",
        &oauth2.client_secret,
    )
    .await?;

    Ok(Extension::OAuth2Client(OAuth2Extension {
        token_url,
        client_id,
        client_secret,
        scopes: oauth2.scopes.clone(),
        endpoint_params: oauth2.params.clone(),
    }))
}

async fn basic_auth_header(
    secrets: &SecretContext<'_>,
    binder: &mut Binder<'_, '_>,
    basic: &BasicAuthOptions,
) -> Result<String> {
    let (user, user_source) = secrets.text(&basic.user).await?;
    let (password, password_source) = secrets.text(&basic.password).await?;
    let header = format!("Basic {}", STANDARD.encode(format!("{user}:{password}")));

    Ok(binder.bind(
        &env_key(BASIC_AUTH_HEADER, binder.pipeline),
        &format!("headers.{AUTHORIZATION_HEADER}"),
        vec![user_source, password_source],
        SecretValue::from(header.as_str()),
    ))
}

async fn tls_config(
    secrets: &SecretContext<'_>,
    binder: &mut Binder<'_, '_>,
    tls: Option<&OutputTls>,
    insecure_scheme: bool,
) -> Result<TlsConfig> {
    let Some(tls) = tls else {
        return Ok(TlsConfig {
            insecure: insecure_scheme,
            ..Default::default()
        });
    };

    let mut config = TlsConfig {
        insecure: insecure_scheme || tls.insecure,
        insecure_skip_verify: tls.insecure_skip_verify,
        ..Default::default()
    };

    if let Some(ca) = &tls.ca {
        config.ca_pem = Some(bind_pem(secrets, binder, TLS_CA_PEM, "tls.ca_pem", ca).await?);
    }
    if let (Some(cert), Some(key)) = (&tls.cert, &tls.key) {
        config.cert_pem = Some(bind_pem(secrets, binder, TLS_CERT_PEM, "tls.cert_pem", cert).await?);
        config.key_pem = Some(bind_pem(secrets, binder, TLS_KEY_PEM, "tls.key_pem", key).await?);
    }

    Ok(config)
}

/// PEM material pasted into a single-line field carries literal `\n` sequences
async fn bind_pem(
    secrets: &SecretContext<'_>,
    binder: &mut Binder<'_, '_>,
    prefix: &str,
    field: &str,
    value: &ValueType,
) -> Result<String> {
    let (pem, source) = secrets.text(value).await?;
    let pem = pem.replace("\\n", "\n");
    Ok(binder.bind(
        &env_key(prefix, binder.pipeline),
        field,
        vec![source],
        SecretValue::from(pem.as_str()),
    ))
}

async fn bind_value(
    secrets: &SecretContext<'_>,
    binder: &mut Binder<'_, '_>,
    prefix: &str,
    field: &str,
    value: &ValueType,
) -> Result<String> {
    let (resolved, source) = secrets.value(value).await?;
    Ok(binder.bind(&env_key(prefix, binder.pipeline), field, vec![source], resolved))
}

/// Joins `path` onto the endpoint's own path, collapsing duplicate slashes
fn join_path(endpoint: &str, path: &str) -> Option<String> {
    let mut url = Url::parse(endpoint).ok()?;
    if url.cannot_be_a_base() {
        return None;
    }

    let segments: Vec<&str> = url
        .path()
        .split('/')
        .chain(path.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    url.set_path(&format!("/{}", segments.join("/")));
    Some(url.to_string())
}

/// Binds values on behalf of one component, recording the field they land in
struct Binder<'e, 'a> {
    env: &'e mut EnvScope<'a>,
    pipeline: &'e str,
    signal: Signal,
    /// `<section>.<id>` of the component being built
    component: String,
}

impl Binder<'_, '_> {
    fn bind(
        &mut self,
        base: &str,
        field: &str,
        sources: Vec<ValueSource>,
        value: SecretValue,
    ) -> String {
        let target = FieldPath {
            signal: self.signal,
            path: format!("{}.{field}", self.component),
        };
        self.env.bind(base, self.pipeline, sources, target, value)
    }
}
