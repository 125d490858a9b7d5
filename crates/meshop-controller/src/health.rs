//! Readiness of the required control plane children
//!
//! istiod must have a ready replica, istio-cni-node must be ready on every
//! node it is scheduled to (when CNI is enabled), and the sidecar injector
//! webhook must exist. The most specific failure wins.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use tracing::warn;

use meshop_common::crd::reasons;
use meshop_common::values::ValueTree;

use crate::client::KubeClient;

/// Name of the istiod Deployment
pub const ISTIOD_DEPLOYMENT: &str = "istiod";
/// Name of the CNI DaemonSet
pub const CNI_DAEMON_SET: &str = "istio-cni-node";

const CNI_ENABLED_PATH: &str = "istio_cni.enabled";
const CNI_NAMESPACE_PATH: &str = "istio_cni.namespace";

/// Name of the injector webhook of a control plane installed in `namespace`
pub fn sidecar_injector_name(namespace: &str) -> String {
    format!("istio-sidecar-injector-{}", namespace)
}

/// Outcome of a readiness check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Every required child is ready
    Ready,
    /// A required child was observed and is not ready
    NotReady {
        /// Condition reason
        reason: &'static str,
        /// Human readable detail
        message: String,
    },
    /// Some child could not be fetched; the prior status stands
    Unknown {
        /// What failed
        message: String,
    },
}

/// Where the required children live
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadinessTargets {
    /// Control plane namespace (istiod)
    pub namespace: String,
    /// CNI namespace, `None` when CNI is disabled
    pub cni_namespace: Option<String>,
}

impl ReadinessTargets {
    /// Targets for a control plane in `namespace` rendered from `values`
    pub fn from_values(namespace: &str, values: &ValueTree) -> Self {
        let cni_enabled = values
            .get_bool(CNI_ENABLED_PATH)
            .ok()
            .flatten()
            .unwrap_or(false);
        let cni_namespace = cni_enabled.then(|| {
            values
                .get_string(CNI_NAMESPACE_PATH)
                .ok()
                .flatten()
                .unwrap_or_else(|| namespace.to_string())
        });
        Self {
            namespace: namespace.to_string(),
            cni_namespace,
        }
    }
}

fn not_ready(reason: &'static str, message: impl Into<String>) -> Option<Readiness> {
    Some(Readiness::NotReady {
        reason,
        message: message.into(),
    })
}

/// Why istiod is not ready, or `None` when it is
pub fn deployment_readiness(deployment: &Deployment) -> Option<Readiness> {
    let desired = deployment.spec.as_ref().and_then(|s| s.replicas);
    if desired == Some(0) {
        return not_ready(
            reasons::ISTIOD_SCALED_TO_ZERO,
            "istiod Deployment is scaled to zero replicas",
        );
    }
    let ready = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    if ready < 1 {
        return not_ready(reasons::ISTIOD_NOT_READY, "not all istiod pods are ready");
    }
    None
}

/// Why the CNI DaemonSet is not ready, or `None` when it is
pub fn daemon_set_readiness(daemon_set: &DaemonSet) -> Option<Readiness> {
    let (scheduled, ready) = daemon_set
        .status
        .as_ref()
        .map(|s| (s.current_number_scheduled, s.number_ready))
        .unwrap_or((0, 0));
    if scheduled == 0 || ready < scheduled {
        return not_ready(
            reasons::CNI_NOT_READY,
            format!("istio-cni-node is ready on {} of {} nodes", ready, scheduled),
        );
    }
    None
}

/// Check every required child
///
/// Children are fetched independently. An observed not-ready child is
/// reported even if another fetch failed; otherwise a failed fetch yields
/// [`Readiness::Unknown`].
pub async fn check_readiness(client: &dyn KubeClient, targets: &ReadinessTargets) -> Readiness {
    let mut failures = Vec::new();

    match client
        .get_deployment(&targets.namespace, ISTIOD_DEPLOYMENT)
        .await
    {
        Ok(Some(deployment)) => {
            if let Some(readiness) = deployment_readiness(&deployment) {
                return readiness;
            }
        }
        Ok(None) => {
            return Readiness::NotReady {
                reason: reasons::ISTIOD_NOT_READY,
                message: "istiod Deployment not found".to_string(),
            }
        }
        Err(e) => failures.push(format!("istiod: {}", e)),
    }

    if let Some(cni_namespace) = &targets.cni_namespace {
        match client.get_daemon_set(cni_namespace, CNI_DAEMON_SET).await {
            Ok(Some(daemon_set)) => {
                if let Some(readiness) = daemon_set_readiness(&daemon_set) {
                    return readiness;
                }
            }
            Ok(None) => {
                return Readiness::NotReady {
                    reason: reasons::CNI_NOT_READY,
                    message: "istio-cni-node DaemonSet not found".to_string(),
                }
            }
            Err(e) => failures.push(format!("istio-cni-node: {}", e)),
        }
    }

    let webhook = sidecar_injector_name(&targets.namespace);
    match client.get_mutating_webhook(&webhook).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Readiness::NotReady {
                reason: reasons::WEBHOOK_NOT_READY,
                message: format!("MutatingWebhookConfiguration {} not found", webhook),
            }
        }
        Err(e) => failures.push(format!("{}: {}", webhook, e)),
    }

    if failures.is_empty() {
        Readiness::Ready
    } else {
        warn!(failures = ?failures, "readiness check incomplete");
        Readiness::Unknown {
            message: failures.join("; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockKubeClient;
    use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
    use k8s_openapi::api::apps::v1::{DaemonSetStatus, DeploymentSpec, DeploymentStatus};
    use meshop_common::Error;
    use serde_json::json;

    fn istiod(ready: i32) -> Deployment {
        Deployment {
            status: Some(DeploymentStatus {
                replicas: Some(1),
                ready_replicas: Some(ready),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn cni(scheduled: i32, ready: i32) -> DaemonSet {
        DaemonSet {
            status: Some(DaemonSetStatus {
                current_number_scheduled: scheduled,
                number_ready: ready,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn targets(cni: bool) -> ReadinessTargets {
        ReadinessTargets {
            namespace: "istio-system".to_string(),
            cni_namespace: cni.then(|| "meshop-system".to_string()),
        }
    }

    fn healthy_client() -> MockKubeClient {
        let mut mock = MockKubeClient::new();
        mock.expect_get_deployment()
            .returning(|_, _| Ok(Some(istiod(1))));
        mock.expect_get_daemon_set()
            .returning(|_, _| Ok(Some(cni(3, 3))));
        mock.expect_get_mutating_webhook()
            .returning(|_| Ok(Some(MutatingWebhookConfiguration::default())));
        mock
    }

    fn unavailable() -> Error {
        Error::from(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "etcd leader changed".to_string(),
            reason: "ServiceUnavailable".to_string(),
            code: 503,
        }))
    }

    // ==========================================================================
    // Story Tests: Readiness Of The Control Plane
    // ==========================================================================

    /// Story: istiod and CNI ready on every node means Ready
    #[tokio::test]
    async fn story_all_children_ready() {
        let mock = healthy_client();
        assert_eq!(check_readiness(&mock, &targets(true)).await, Readiness::Ready);
    }

    /// Story: istiod losing its ready pod flips readiness
    #[tokio::test]
    async fn story_istiod_not_ready() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_deployment()
            .returning(|_, _| Ok(Some(istiod(0))));
        mock.expect_get_daemon_set()
            .returning(|_, _| Ok(Some(cni(3, 3))));
        mock.expect_get_mutating_webhook()
            .returning(|_| Ok(Some(MutatingWebhookConfiguration::default())));

        match check_readiness(&mock, &targets(true)).await {
            Readiness::NotReady { reason, .. } => assert_eq!(reason, reasons::ISTIOD_NOT_READY),
            other => panic!("expected NotReady, got {other:?}"),
        }
    }

    /// Story: A CNI fetch failing leaves the outcome unknown
    ///
    /// istiod is fine but the CNI DaemonSet cannot be read. Nothing was
    /// observed to be unhealthy, so the check does not claim NotReady.
    #[tokio::test]
    async fn story_partial_fetch_failure_is_unknown() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_deployment()
            .returning(|_, _| Ok(Some(istiod(1))));
        mock.expect_get_daemon_set()
            .returning(|_, _| Err(unavailable()));
        mock.expect_get_mutating_webhook()
            .returning(|_| Ok(Some(MutatingWebhookConfiguration::default())));

        match check_readiness(&mock, &targets(true)).await {
            Readiness::Unknown { message } => assert!(message.contains("istio-cni-node")),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn observed_failure_wins_over_fetch_failure() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_deployment()
            .returning(|_, _| Err(unavailable()));
        mock.expect_get_daemon_set()
            .returning(|_, _| Ok(Some(cni(3, 1))));
        mock.expect_get_mutating_webhook().never();

        match check_readiness(&mock, &targets(true)).await {
            Readiness::NotReady { reason, .. } => assert_eq!(reason, reasons::CNI_NOT_READY),
            other => panic!("expected NotReady, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cni_is_skipped_when_disabled() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_deployment()
            .returning(|_, _| Ok(Some(istiod(1))));
        mock.expect_get_daemon_set().never();
        mock.expect_get_mutating_webhook()
            .withf(|name| name == "istio-sidecar-injector-istio-system")
            .returning(|_| Ok(None));

        match check_readiness(&mock, &targets(false)).await {
            Readiness::NotReady { reason, .. } => assert_eq!(reason, reasons::WEBHOOK_NOT_READY),
            other => panic!("expected NotReady, got {other:?}"),
        }
    }

    #[test]
    fn scaled_to_zero_is_reported_separately() {
        let deployment = Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        match deployment_readiness(&deployment) {
            Some(Readiness::NotReady { reason, .. }) => {
                assert_eq!(reason, reasons::ISTIOD_SCALED_TO_ZERO)
            }
            other => panic!("expected NotReady, got {other:?}"),
        }
    }

    #[test]
    fn daemon_set_without_scheduled_pods_is_not_ready() {
        assert!(daemon_set_readiness(&cni(0, 0)).is_some());
        assert!(daemon_set_readiness(&cni(3, 2)).is_some());
        assert!(daemon_set_readiness(&cni(3, 3)).is_none());
    }

    #[test]
    fn targets_follow_cni_values() {
        let values: ValueTree = serde_json::from_value(json!({
            "istio_cni": {"enabled": true, "namespace": "meshop-system"}
        }))
        .unwrap();
        let t = ReadinessTargets::from_values("istio-system", &values);
        assert_eq!(t.cni_namespace.as_deref(), Some("meshop-system"));

        let t = ReadinessTargets::from_values("istio-system", &ValueTree::new());
        assert_eq!(t.cni_namespace, None);
    }
}
