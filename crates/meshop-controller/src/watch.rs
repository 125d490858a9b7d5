//! Child watches for drift correction
//!
//! Every kind the charts render is watched. An event on a child is routed
//! to its owning MeshControlPlane through the controller owner reference,
//! which re-applies the full desired set and so reverts edits and recreates
//! deleted children.

use kube::discovery::ApiResource;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::Resource;
use tracing::trace;

use meshop_common::crd::MeshControlPlane;
use meshop_common::kube_utils::build_api_resource;
use meshop_common::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};

use crate::ownership::owning_control_plane;

/// Kinds rendered by the control plane charts, as (apiVersion, kind)
pub const CHILD_KINDS: &[(&str, &str)] = &[
    ("v1", "ServiceAccount"),
    ("v1", "ConfigMap"),
    ("v1", "Service"),
    ("apps/v1", "Deployment"),
    ("apps/v1", "DaemonSet"),
    ("policy/v1", "PodDisruptionBudget"),
    ("autoscaling/v2", "HorizontalPodAutoscaler"),
    ("rbac.authorization.k8s.io/v1", "Role"),
    ("rbac.authorization.k8s.io/v1", "RoleBinding"),
    ("rbac.authorization.k8s.io/v1", "ClusterRole"),
    ("rbac.authorization.k8s.io/v1", "ClusterRoleBinding"),
    ("admissionregistration.k8s.io/v1", "MutatingWebhookConfiguration"),
    ("admissionregistration.k8s.io/v1", "ValidatingWebhookConfiguration"),
];

/// ApiResources for every watched child kind
pub fn child_resources() -> Vec<ApiResource> {
    CHILD_KINDS
        .iter()
        .map(|(api_version, kind)| build_api_resource(api_version, kind))
        .collect()
}

/// Watch only objects stamped as ours
pub fn child_watcher_config(timeout_secs: u32) -> WatcherConfig {
    WatcherConfig::default()
        .labels(&format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE))
        .timeout(timeout_secs)
}

/// Map a child event to a reconcile request for its owner
///
/// The owner is cluster-scoped, so the request never carries the child's
/// namespace.
pub fn owner_request<K: Resource>(child: K) -> Option<ObjectRef<MeshControlPlane>> {
    let owner = owning_control_plane(child.meta())?;
    trace!(
        child = child.meta().name.as_deref().unwrap_or_default(),
        owner = %owner,
        "child changed"
    );
    Some(ObjectRef::new(&owner))
}
