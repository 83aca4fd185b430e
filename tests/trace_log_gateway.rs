//! Trace and log gateway builds through the public API

mod common;

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio_util::sync::CancellationToken;

use telemetry_operator::collector::config::Exporter;
use telemetry_operator::collector::{
    merge, BuildOptions, LogGatewayBuilder, ServicePipelineId, Signal, StaticSecretResolver,
    TraceGatewayBuilder,
};
use telemetry_operator::crd::{
    AuthenticationOptions, BasicAuthOptions, FilterSpec, Header, LogOtlpInput, LogPipelineInput,
    NamespaceSelector, OAuth2Options, OtlpProtocol, OutputTls, ValueType,
};
use telemetry_operator::Error;

use common::{init_tracing, log_pipeline, no_secrets, otlp, secret, trace_pipeline};

#[tokio::test]
async fn test_trace_basic_auth() -> anyhow::Result<()> {
    init_tracing();
    let resolver = StaticSecretResolver::new()
        .with(secret("backend", "user"), "shop")
        .with(secret("backend", "password"), "hunter2");

    let mut output = otlp("https://backend:4317");
    output.authentication = Some(AuthenticationOptions {
        basic: Some(BasicAuthOptions {
            user: ValueType::from_secret(secret("backend", "user")),
            password: ValueType::from_secret(secret("backend", "password")),
        }),
        oauth2: None,
    });

    let built = TraceGatewayBuilder::new(Arc::new(resolver), BuildOptions::default())
        .build(&CancellationToken::new(), &[trace_pipeline("p", output)])
        .await?;

    let ids: Vec<String> = built
        .config
        .service
        .pipelines
        .keys()
        .map(ToString::to_string)
        .collect();
    assert_eq!(ids, vec!["traces/p"]);

    let Some(Exporter::Otlp(exporter)) = built.config.exporters.get("otlp/p") else {
        panic!("expected otlp/p");
    };
    assert_eq!(
        exporter.headers.get("Authorization").map(String::as_str),
        Some("${BASIC_AUTH_HEADER_P}")
    );
    assert!(!exporter.tls.insecure);

    let binding = built.env.get("BASIC_AUTH_HEADER_P").unwrap();
    let expected = format!("Basic {}", STANDARD.encode("shop:hunter2"));
    assert_eq!(binding.value.expose(), expected.as_bytes());
    assert_eq!(binding.target.signal, Signal::Traces);
    assert_eq!(binding.secret_refs().count(), 2);

    let yaml = built.to_yaml()?;
    assert!(!yaml.contains("hunter2"));
    assert!(!yaml.contains(&STANDARD.encode("shop:hunter2")));
    merge::validate(&built.config)?;
    Ok(())
}

#[tokio::test]
async fn test_trace_headers_and_tls() {
    let mut output = otlp("https://backend:4317");
    output.headers = vec![Header {
        name: "X-Tenant".to_string(),
        prefix: Some("Tenant ".to_string()),
        value: ValueType::inline("shop"),
    }];
    output.tls = Some(OutputTls {
        ca: Some(ValueType::inline("-----BEGIN CERTIFICATE-----\\nMIIB\\n-----END CERTIFICATE-----")),
        ..Default::default()
    });

    let built = TraceGatewayBuilder::new(no_secrets(), BuildOptions::default())
        .build(&CancellationToken::new(), &[trace_pipeline("p", output)])
        .await
        .unwrap();

    let Some(Exporter::Otlp(exporter)) = built.config.exporters.get("otlp/p") else {
        panic!("expected otlp/p");
    };
    assert_eq!(
        exporter.headers.get("X-Tenant").map(String::as_str),
        Some("${HEADER_P_X_TENANT}")
    );
    assert_eq!(exporter.tls.ca_pem.as_deref(), Some("${OTLP_TLS_CA_PEM_P}"));

    let header = built.env.get("HEADER_P_X_TENANT").unwrap();
    assert_eq!(header.value.expose(), b"Tenant shop");
    let ca = built.env.get("OTLP_TLS_CA_PEM_P").unwrap();
    assert_eq!(
        ca.value.expose(),
        b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----"
    );
}

#[tokio::test]
async fn test_duplicate_authorization_header_rejected() {
    let mut output = otlp("https://backend:4317");
    output.authentication = Some(AuthenticationOptions {
        basic: Some(BasicAuthOptions {
            user: ValueType::inline("shop"),
            password: ValueType::inline("pw"),
        }),
        oauth2: None,
    });
    output.headers = vec![Header {
        name: "authorization".to_string(),
        prefix: None,
        value: ValueType::inline("Bearer token"),
    }];

    let built = TraceGatewayBuilder::new(no_secrets(), BuildOptions::default())
        .build(
            &CancellationToken::new(),
            &[
                trace_pipeline("dup", output),
                trace_pipeline("fine", otlp("https://backend:4317")),
            ],
        )
        .await
        .unwrap();

    assert_eq!(built.rejected.len(), 1);
    assert_eq!(built.rejected[0].name, "dup");
    assert!(built.config.exporters.contains_key("otlp/fine"));
    assert!(!built.env.contains("BASIC_AUTH_HEADER_DUP"));
}

#[tokio::test]
async fn test_http_protocol_joins_signal_path() {
    let mut output = otlp("https://backend:4318/otlp/");
    output.protocol = OtlpProtocol::Http;
    output.path = Some("/v1/traces".to_string());

    let built = TraceGatewayBuilder::new(no_secrets(), BuildOptions::default())
        .build(&CancellationToken::new(), &[trace_pipeline("p", output)])
        .await
        .unwrap();

    let Some(Exporter::Otlp(exporter)) = built.config.exporters.get("otlphttp/p") else {
        panic!("expected otlphttp/p");
    };
    assert!(exporter.endpoint.is_none());
    assert_eq!(
        exporter.traces_endpoint.as_deref(),
        Some("${OTLP_ENDPOINT_P}")
    );
    assert_eq!(
        built.env.get("OTLP_ENDPOINT_P").unwrap().value.expose(),
        b"https://backend:4318/otlp/v1/traces"
    );
}

#[tokio::test]
async fn test_trace_oauth2_needs_no_leader_election() {
    let mut output = otlp("https://backend:4317");
    output.authentication = Some(AuthenticationOptions {
        basic: None,
        oauth2: Some(OAuth2Options {
            token_url: ValueType::inline("https://auth.local/token"),
            client_id: ValueType::inline("id"),
            client_secret: ValueType::inline("secret"),
            scopes: vec!["telemetry".to_string()],
            ..Default::default()
        }),
    });
    let options = BuildOptions {
        leader_election_namespace: Some("kyma-system".to_string()),
        ..Default::default()
    };

    let built = TraceGatewayBuilder::new(no_secrets(), options)
        .build(&CancellationToken::new(), &[trace_pipeline("p", output)])
        .await
        .unwrap();

    assert_eq!(
        built.config.service.extensions.iter().collect::<Vec<_>>(),
        vec!["health_check", "oauth2client/p", "pprof"]
    );
}

#[tokio::test]
async fn test_log_otlp_input_disabled() -> anyhow::Result<()> {
    let mut pipeline = log_pipeline("p", otlp("https://backend:4317"));
    pipeline.spec.input = LogPipelineInput {
        otlp: Some(LogOtlpInput {
            disabled: true,
            namespaces: None,
        }),
    };

    let built = LogGatewayBuilder::new(no_secrets(), BuildOptions::default())
        .build(&CancellationToken::new(), &[pipeline])
        .await?;

    let logs = built
        .config
        .pipeline(&ServicePipelineId::single(Signal::Logs, "p"))
        .unwrap();
    assert_eq!(
        logs.processors,
        vec![
            "memory_limiter",
            "filter/drop-if-input-source-otlp",
            "k8sattributes",
            "resource/insert-cluster-attributes",
            "service_enrichment",
            "resource/drop-kyma-attributes",
            "batch",
        ]
    );
    merge::validate(&built.config)?;
    Ok(())
}

/// A pipeline name may contain another template's fixed text
#[tokio::test]
async fn test_pipeline_names_spelling_other_templates_do_not_collide() -> anyhow::Result<()> {
    let mut namespaced = log_pipeline("user-defined-x", otlp("https://backend:4317"));
    namespaced.spec.input = LogPipelineInput {
        otlp: Some(LogOtlpInput {
            disabled: false,
            namespaces: Some(NamespaceSelector {
                include: vec!["ns".to_string()],
                exclude: vec![],
            }),
        }),
    };
    let mut filtered = log_pipeline("x-filter-by-namespace", otlp("https://backend:4317"));
    filtered.spec.filters.push(FilterSpec {
        conditions: vec!["true".to_string()],
    });

    let built = LogGatewayBuilder::new(no_secrets(), BuildOptions::default())
        .build(&CancellationToken::new(), &[namespaced, filtered])
        .await?;

    assert!(built.rejected.is_empty());
    assert!(built
        .config
        .processors
        .contains_key("filter/user-defined-x-filter-by-namespace"));
    assert!(built
        .config
        .processors
        .contains_key("filter/x-filter-by-namespace-user-defined"));
    merge::validate(&built.config)?;
    Ok(())
}

#[tokio::test]
async fn test_log_pipeline_with_missing_endpoint_is_partial_failure() {
    let built = LogGatewayBuilder::new(no_secrets(), BuildOptions::default())
        .build(
            &CancellationToken::new(),
            &[
                log_pipeline("broken", otlp("")),
                log_pipeline("fine", otlp("https://backend:4317")),
            ],
        )
        .await
        .unwrap();

    let Some(Error::PartialFailure(rejected)) = built.partial_failure() else {
        panic!("expected partial failure");
    };
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].name, "broken");
    assert_eq!(built.config.service.pipelines.len(), 1);
}

#[tokio::test]
async fn test_secret_data_for_deployment() {
    let built = LogGatewayBuilder::new(no_secrets(), BuildOptions::default())
        .build(
            &CancellationToken::new(),
            &[
                log_pipeline("b", otlp("https://b:4317")),
                log_pipeline("a", otlp("https://a:4317")),
            ],
        )
        .await
        .unwrap();

    let data = built.env.to_secret_data();
    assert_eq!(
        data.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["OTLP_ENDPOINT_A", "OTLP_ENDPOINT_B"]
    );
    assert_eq!(data["OTLP_ENDPOINT_A"].0, b"https://a:4317".to_vec());
}
