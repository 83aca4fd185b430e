//! OTTL predicate builder
//!
//! Predicates are strings in the collector's transformation language. Filter
//! processors drop a record when any of their predicates evaluates to true.

use crate::crd::{MetricInputSource, NamespaceSelector};

pub const K8S_NAMESPACE_NAME: &str = "k8s.namespace.name";

pub const KYMA_INPUT_NAME_ATTRIBUTE: &str = "kyma.input.name";
pub const KYMA_INPUT_PROMETHEUS: &str = "prometheus";

pub const SCOPE_RUNTIME: &str = "io.kyma-project.telemetry/runtime";
pub const SCOPE_PROMETHEUS: &str = "io.kyma-project.telemetry/prometheus";
pub const SCOPE_ISTIO: &str = "io.kyma-project.telemetry/istio";
pub const SCOPE_KYMA_STATS: &str = "io.kyma-project.telemetry/kyma";

pub fn resource_attribute_equals(attr: &str, value: &str) -> String {
    format!("resource.attributes[\"{attr}\"] == \"{value}\"")
}

pub fn resource_attribute_is_not_nil(attr: &str) -> String {
    format!("resource.attributes[\"{attr}\"] != nil")
}

pub fn namespace_equals(namespace: &str) -> String {
    resource_attribute_equals(K8S_NAMESPACE_NAME, namespace)
}

pub fn scope_name_equals(name: &str) -> String {
    format!("instrumentation_scope.name == \"{name}\"")
}

pub fn is_match(key: &str, regex: &str) -> String {
    format!("IsMatch({key}, \"{regex}\")")
}

pub fn not(predicate: &str) -> String {
    format!("not({predicate})")
}

/// Parenthesised disjunction; a single operand is returned unchanged
pub fn join_with_or<S: AsRef<str>>(predicates: &[S]) -> String {
    join(predicates, " or ", true)
}

pub fn join_with_and<S: AsRef<str>>(predicates: &[S]) -> String {
    join(predicates, " and ", false)
}

fn join<S: AsRef<str>>(predicates: &[S], separator: &str, parenthesise: bool) -> String {
    let parts: Vec<&str> = predicates.iter().map(AsRef::as_ref).collect();
    match parts.as_slice() {
        [] => String::new(),
        [single] => (*single).to_string(),
        _ if parenthesise => format!("({})", parts.join(separator)),
        _ => parts.join(separator),
    }
}

/// Predicate that is true for data produced by the given input source
pub fn input_source_equals(source: MetricInputSource) -> String {
    match source {
        MetricInputSource::Runtime => scope_name_equals(SCOPE_RUNTIME),
        MetricInputSource::Prometheus => {
            resource_attribute_equals(KYMA_INPUT_NAME_ATTRIBUTE, KYMA_INPUT_PROMETHEUS)
        }
        MetricInputSource::Istio => scope_name_equals(SCOPE_ISTIO),
        MetricInputSource::Otlp => otlp_input_source(),
    }
}

/// Data pushed directly over OTLP carries none of the agent or kyma-stats markers
pub fn otlp_input_source() -> String {
    not(&[
        scope_name_equals(SCOPE_RUNTIME),
        resource_attribute_equals(KYMA_INPUT_NAME_ATTRIBUTE, KYMA_INPUT_PROMETHEUS),
        scope_name_equals(SCOPE_ISTIO),
        scope_name_equals(SCOPE_KYMA_STATS),
    ]
    .join(" or "))
}

/// Drop predicates for a namespace selector, guarded by the input source condition
///
/// Exclude drops records from the listed namespaces. Include is expressed as a
/// drop of the complement, which needs the namespace attribute to exist so that
/// records without one are kept.
pub fn namespace_selector_predicates(selector: &NamespaceSelector, source_guard: &str) -> Vec<String> {
    let mut predicates = Vec::new();

    if !selector.exclude.is_empty() {
        let namespaces = namespaces_conditions(&selector.exclude);
        let mut parts = Vec::with_capacity(2);
        if !source_guard.is_empty() {
            parts.push(source_guard.to_string());
        }
        parts.push(join_with_or(&namespaces));
        predicates.push(join_with_and(&parts));
    }

    if !selector.include.is_empty() {
        let namespaces = namespaces_conditions(&selector.include);
        let mut parts = Vec::with_capacity(3);
        if !source_guard.is_empty() {
            parts.push(source_guard.to_string());
        }
        parts.push(resource_attribute_is_not_nil(K8S_NAMESPACE_NAME));
        parts.push(not(&join_with_or(&namespaces)));
        predicates.push(join_with_and(&parts));
    }

    predicates
}

fn namespaces_conditions(namespaces: &[String]) -> Vec<String> {
    namespaces.iter().map(|ns| namespace_equals(ns)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives() {
        assert_eq!(
            resource_attribute_equals("k8s.pod.name", "a"),
            r#"resource.attributes["k8s.pod.name"] == "a""#
        );
        assert_eq!(
            resource_attribute_is_not_nil("k8s.namespace.name"),
            r#"resource.attributes["k8s.namespace.name"] != nil"#
        );
        assert_eq!(
            scope_name_equals(SCOPE_ISTIO),
            r#"instrumentation_scope.name == "io.kyma-project.telemetry/istio""#
        );
        assert_eq!(is_match("name", "^envoy_.*"), r#"IsMatch(name, "^envoy_.*")"#);
    }

    #[test]
    fn test_combinators() {
        assert_eq!(join_with_or(&["a", "b"]), "(a or b)");
        assert_eq!(join_with_or(&["a"]), "a");
        assert_eq!(join_with_and(&["a", "b", "c"]), "a and b and c");
        assert_eq!(not("a"), "not(a)");
        assert_eq!(join_with_and::<&str>(&[]), "");
    }

    #[test]
    fn test_otlp_guard_excludes_kyma_stats() {
        let guard = otlp_input_source();
        assert!(guard.starts_with("not("));
        assert!(guard.contains(SCOPE_KYMA_STATS));
        assert!(guard.contains(SCOPE_RUNTIME));
        assert!(guard.contains(SCOPE_ISTIO));
        assert!(guard.contains(r#"resource.attributes["kyma.input.name"] == "prometheus""#));
    }

    #[test]
    fn test_exclude_predicate() {
        let selector = NamespaceSelector {
            include: vec![],
            exclude: vec!["kube-system".to_string(), "istio-system".to_string()],
        };
        let predicates = namespace_selector_predicates(&selector, "GUARD");
        assert_eq!(
            predicates,
            vec![
                r#"GUARD and (resource.attributes["k8s.namespace.name"] == "kube-system" or resource.attributes["k8s.namespace.name"] == "istio-system")"#
            ]
        );
    }

    #[test]
    fn test_include_predicate_checks_attribute_exists() {
        let selector = NamespaceSelector {
            include: vec!["ns-a".to_string(), "ns-b".to_string()],
            exclude: vec![],
        };
        let predicates = namespace_selector_predicates(&selector, "GUARD");
        assert_eq!(
            predicates,
            vec![
                r#"GUARD and resource.attributes["k8s.namespace.name"] != nil and not((resource.attributes["k8s.namespace.name"] == "ns-a" or resource.attributes["k8s.namespace.name"] == "ns-b"))"#
            ]
        );
    }

    #[test]
    fn test_include_and_exclude_emit_both() {
        let selector = NamespaceSelector {
            include: vec!["a".to_string()],
            exclude: vec!["b".to_string()],
        };
        let predicates = namespace_selector_predicates(&selector, "GUARD");
        assert_eq!(predicates.len(), 2);
        assert!(predicates[0].contains(r#"== "b""#));
        assert!(predicates[1].contains("!= nil"));
    }

    #[test]
    fn test_unguarded_include_for_logs() {
        let selector = NamespaceSelector {
            include: vec!["a".to_string()],
            exclude: vec![],
        };
        let predicates = namespace_selector_predicates(&selector, "");
        assert_eq!(
            predicates,
            vec![
                r#"resource.attributes["k8s.namespace.name"] != nil and not(resource.attributes["k8s.namespace.name"] == "a")"#
            ]
        );
    }
}
