//! Document-wide properties: reference closure, determinism, input-order
//! independence and secret hygiene

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use telemetry_operator::collector::components;
use telemetry_operator::collector::config::{BatchProcessor, Processor};
use telemetry_operator::collector::fragment::Fragment;
use telemetry_operator::collector::merge::{self, Merger};
use telemetry_operator::collector::{
    BuildOptions, BuildOutput, MetricGatewayBuilder, ServicePipelineId, Signal, StaticId,
    StaticSecretResolver,
};
use telemetry_operator::crd::{
    AuthenticationOptions, BasicAuthOptions, IstioInput, MetricPipeline, MetricPipelineInput,
    NamespaceSelector, OtlpInput, PrometheusInput, RuntimeInput, Toggle, ValueType,
};
use telemetry_operator::Error;

use common::{metric_pipeline, metric_pipeline_to, no_secrets, otlp, secret};

fn input(runtime: bool, prometheus: bool, istio: bool, otlp_disabled: bool) -> MetricPipelineInput {
    MetricPipelineInput {
        runtime: runtime.then(|| RuntimeInput {
            enabled: true,
            namespaces: Some(NamespaceSelector {
                include: vec![],
                exclude: vec!["kube-system".to_string()],
            }),
            ..Default::default()
        }),
        prometheus: prometheus.then(|| PrometheusInput {
            enabled: true,
            ..Default::default()
        }),
        istio: istio.then(|| IstioInput {
            enabled: true,
            envoy_metrics: Some(Toggle { enabled: true }),
            ..Default::default()
        }),
        otlp: Some(OtlpInput {
            disabled: otlp_disabled,
            namespaces: None,
        }),
    }
}

fn build(pipelines: &[MetricPipeline]) -> BuildOutput {
    tokio_test::block_on(
        MetricGatewayBuilder::new(no_secrets(), BuildOptions::default())
            .build(&CancellationToken::new(), pipelines),
    )
    .unwrap()
}

fn bindings(output: &BuildOutput) -> Vec<(String, Vec<u8>)> {
    output
        .env
        .iter()
        .map(|b| (b.name.clone(), b.value.expose().to_vec()))
        .collect()
}

fn pipelines_strategy() -> impl Strategy<Value = Vec<MetricPipeline>> {
    prop::collection::btree_map(
        "[a-z][a-z0-9]{0,6}",
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()),
        1..5,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .map(|(name, (runtime, prometheus, istio, otlp_disabled))| {
                metric_pipeline(&name, input(runtime, prometheus, istio, otlp_disabled))
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_input_order_does_not_change_document(
        (pipelines, shuffled) in pipelines_strategy()
            .prop_flat_map(|p| (Just(p.clone()), Just(p).prop_shuffle()))
    ) {
        let sorted = build(&pipelines);
        let permuted = build(&shuffled);

        prop_assert_eq!(sorted.to_yaml().unwrap(), permuted.to_yaml().unwrap());
        prop_assert_eq!(bindings(&sorted), bindings(&permuted));
    }

    #[test]
    fn prop_every_build_is_closed_and_orphan_free(pipelines in pipelines_strategy()) {
        let output = build(&pipelines);
        prop_assert!(merge::validate(&output.config).is_ok());
        prop_assert!(output.rejected.is_empty());

        // one input and one output segment per pipeline plus the shared enrichment
        prop_assert_eq!(output.config.service.pipelines.len(), pipelines.len() * 2 + 1);
    }
}

#[tokio::test]
async fn test_repeated_builds_are_byte_identical() {
    let pipelines = vec![
        metric_pipeline("shop", input(true, true, false, false)),
        metric_pipeline("mesh", input(false, false, true, true)),
    ];
    let builder = MetricGatewayBuilder::new(no_secrets(), BuildOptions::default());

    let first = builder
        .build(&CancellationToken::new(), &pipelines)
        .await
        .unwrap();
    let second = builder
        .build(&CancellationToken::new(), &pipelines)
        .await
        .unwrap();

    assert_eq!(first.to_yaml().unwrap(), second.to_yaml().unwrap());
    assert_eq!(bindings(&first), bindings(&second));
}

#[tokio::test]
async fn test_emitted_processors_are_exactly_the_referenced_ones() {
    let output = MetricGatewayBuilder::new(no_secrets(), BuildOptions::default())
        .build(
            &CancellationToken::new(),
            &[
                metric_pipeline("a", input(true, false, true, false)),
                metric_pipeline("b", input(false, true, false, true)),
            ],
        )
        .await
        .unwrap();

    let referenced: std::collections::BTreeSet<&str> = output
        .config
        .service
        .pipelines
        .values()
        .flat_map(|p| p.processors.iter().map(String::as_str))
        .collect();
    let emitted: std::collections::BTreeSet<&str> =
        output.config.processors.keys().map(String::as_str).collect();
    assert_eq!(referenced, emitted);

    let b = output
        .config
        .pipeline(&ServicePipelineId::input(Signal::Metrics, "b"))
        .unwrap();
    assert_eq!(
        &b.processors[..4],
        &[
            "filter/drop-if-input-source-runtime",
            "filter/drop-if-input-source-istio",
            "filter/drop-if-input-source-otlp",
            "filter/drop-envoy-metrics-if-disabled",
        ]
    );
}

#[tokio::test]
async fn test_resolved_values_never_reach_the_document() {
    let values = [
        ("endpoint", "https://tenant-7.backend.example:4317"),
        ("user", "tenant-7"),
        ("password", "pa55-w0rd"),
    ];
    let mut resolver = StaticSecretResolver::new();
    for (key, value) in values {
        resolver.insert(secret("backend", key), value);
    }

    let mut output = otlp("");
    output.endpoint = ValueType::from_secret(secret("backend", "endpoint"));
    output.authentication = Some(AuthenticationOptions {
        basic: Some(BasicAuthOptions {
            user: ValueType::from_secret(secret("backend", "user")),
            password: ValueType::from_secret(secret("backend", "password")),
        }),
        oauth2: None,
    });

    let built = MetricGatewayBuilder::new(Arc::new(resolver), BuildOptions::default())
        .build(
            &CancellationToken::new(),
            &[metric_pipeline_to("p", MetricPipelineInput::default(), output)],
        )
        .await
        .unwrap();

    let yaml = built.to_yaml().unwrap();
    for (_, value) in values {
        assert!(!yaml.contains(value), "document leaks {value}");
    }
    assert!(yaml.contains("${OTLP_ENDPOINT_P}"));
    assert!(yaml.contains("${BASIC_AUTH_HEADER_P}"));

    let debug = format!("{:?}", built.env);
    for (_, value) in values {
        assert!(!debug.contains(value), "debug output leaks {value}");
    }
}

#[test]
fn test_conflicting_shared_processor_is_fatal() {
    let fragment = |batch: Processor| {
        let mut fragment = Fragment::new();
        let mut traces = fragment.pipeline(ServicePipelineId::single(Signal::Traces, "p"));
        traces
            .receiver(StaticId::OtlpReceiver.as_str(), components::otlp_receiver())
            .unwrap()
            .processor(StaticId::Batch.as_str(), Some(batch))
            .unwrap()
            .exporter("otlp/p", telemetry_operator::collector::config::Exporter::Otlp(
                Default::default(),
            ))
            .unwrap();
        traces.finish().unwrap();
        fragment.into_config()
    };

    let mut merger = Merger::new();
    merger.merge(fragment(components::batch_processor())).unwrap();

    // An identical body is accepted
    merger.merge(fragment(components::batch_processor())).unwrap();

    let resized = Processor::Batch(BatchProcessor {
        send_batch_size: 1,
        send_batch_max_size: 1,
        timeout: "1s".to_string(),
    });
    let result = merger.merge(fragment(resized));
    assert!(matches!(result, Err(Error::ConsistencyViolation(_))));
}

#[test]
fn test_dangling_reference_is_fatal() {
    let mut fragment = Fragment::new();
    let mut metrics = fragment.pipeline(ServicePipelineId::single(Signal::Metrics, "p"));
    metrics
        .receiver(StaticId::OtlpReceiver.as_str(), components::otlp_receiver())
        .unwrap()
        .exporter("otlp/p", telemetry_operator::collector::config::Exporter::Otlp(
            Default::default(),
        ))
        .unwrap();
    metrics.finish().unwrap();

    let mut config = fragment.into_config();
    config
        .service
        .pipelines
        .values_mut()
        .for_each(|p| p.processors.push("batch".to_string()));

    assert!(matches!(
        merge::validate(&config),
        Err(Error::ConsistencyViolation(_))
    ));
}
