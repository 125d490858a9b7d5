//! Helpers for addressing rendered child resources dynamically

use kube::discovery::ApiResource;

/// Kinds with irregular plurals
const KIND_PLURALS: &[(&str, &str)] = &[
    ("networkpolicy", "networkpolicies"),
    ("podsecuritypolicy", "podsecuritypolicies"),
    ("envoyfilter", "envoyfilters"),
    ("ingress", "ingresses"),
];

/// Kinds that are not namespaced
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleBinding",
    "MutatingWebhookConfiguration",
    "ValidatingWebhookConfiguration",
    "PriorityClass",
    "StorageClass",
];

/// Build an ApiResource from an apiVersion and kind
///
/// The plural is derived from the kind; no discovery call is made.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into (group, version); the core group is ""
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = KIND_PLURALS.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Whether objects of `kind` live outside any namespace
pub fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

/// Apply order: identities and RBAC before config, config before workloads
pub fn kind_priority(kind: &str) -> u8 {
    match kind {
        "Namespace" => 0,
        "CustomResourceDefinition" => 1,
        "ServiceAccount" => 2,
        "ClusterRole" | "Role" => 3,
        "ClusterRoleBinding" | "RoleBinding" => 4,
        "ConfigMap" | "Secret" => 5,
        "Service" => 6,
        "Deployment" | "DaemonSet" | "StatefulSet" => 7,
        "HorizontalPodAutoscaler" | "PodDisruptionBudget" => 8,
        "MutatingWebhookConfiguration" | "ValidatingWebhookConfiguration" => 9,
        _ => 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_api_version_handles_core_group() {
        assert_eq!(parse_api_version("apps/v1"), ("apps".to_string(), "v1".to_string()));
        assert_eq!(parse_api_version("v1"), (String::new(), "v1".to_string()));
    }

    #[test]
    fn pluralize_common_kinds() {
        assert_eq!(pluralize_kind("Deployment"), "deployments");
        assert_eq!(pluralize_kind("PodDisruptionBudget"), "poddisruptionbudgets");
        assert_eq!(pluralize_kind("NetworkPolicy"), "networkpolicies");
        assert_eq!(pluralize_kind("Ingress"), "ingresses");
        assert_eq!(pluralize_kind("ServiceAccount"), "serviceaccounts");
        assert_eq!(pluralize_kind("Gateway"), "gateways");
    }

    #[test]
    fn build_api_resource_for_webhook() {
        let ar = build_api_resource(
            "admissionregistration.k8s.io/v1",
            "MutatingWebhookConfiguration",
        );
        assert_eq!(ar.group, "admissionregistration.k8s.io");
        assert_eq!(ar.version, "v1");
        assert_eq!(ar.plural, "mutatingwebhookconfigurations");
    }

    #[test]
    fn scope_table() {
        assert!(is_cluster_scoped("ClusterRole"));
        assert!(is_cluster_scoped("MutatingWebhookConfiguration"));
        assert!(!is_cluster_scoped("Deployment"));
        assert!(!is_cluster_scoped("Role"));
    }

    #[test]
    fn rbac_before_workloads() {
        assert!(kind_priority("ServiceAccount") < kind_priority("Deployment"));
        assert!(kind_priority("ClusterRole") < kind_priority("ClusterRoleBinding"));
        assert!(kind_priority("Deployment") < kind_priority("MutatingWebhookConfiguration"));
    }
}
