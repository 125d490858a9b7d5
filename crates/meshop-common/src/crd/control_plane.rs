//! MeshControlPlane CRD: one managed service-mesh installation

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::config::{ClusterConfig, GatewaysConfig, ProxyConfig};
use super::status::MeshControlPlaneStatus;
use crate::values::ValueTree;

/// Namespace the control plane components are installed into by default
pub const DEFAULT_CONTROL_PLANE_NAMESPACE: &str = "istio-system";

fn default_namespace() -> String {
    DEFAULT_CONTROL_PLANE_NAMESPACE.to_string()
}

/// Desired state of a mesh control plane
///
/// `values` is passed to the charts as-is; the structured domains are
/// translated into values and win over it on collision. Profile values fill
/// whatever is left.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "mesh.meshop.dev",
    version = "v1alpha1",
    kind = "MeshControlPlane",
    plural = "meshcontrolplanes",
    shortname = "mcp",
    status = "MeshControlPlaneStatus",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".spec.namespace"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MeshControlPlaneSpec {
    /// Control plane version (e.g. "v3.0"); latest when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Profile merged under the values; "default" when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub profile: String,

    /// Namespace the control plane components are installed into
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Cluster identity, federation, and mesh expansion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterConfig>,

    /// Gateway enablement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateways: Option<GatewaysConfig>,

    /// Sidecar proxy settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,

    /// Raw chart values
    #[serde(default, skip_serializing_if = "ValueTree::is_empty")]
    pub values: ValueTree,
}

impl Default for MeshControlPlaneSpec {
    fn default() -> Self {
        Self {
            version: String::new(),
            profile: String::new(),
            namespace: default_namespace(),
            cluster: None,
            gateways: None,
            proxy: None,
            values: ValueTree::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;
    use kube::Resource;
    use serde_json::json;

    #[test]
    fn crd_is_cluster_scoped() {
        let crd = MeshControlPlane::crd();
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.group, "mesh.meshop.dev");
        assert_eq!(crd.spec.names.kind, "MeshControlPlane");
    }

    #[test]
    fn condition_timestamp_is_a_date_time_string() {
        let crd = serde_json::to_value(MeshControlPlane::crd()).unwrap();
        let status = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]
            ["status"]["properties"];
        let timestamp = &status["conditions"]["items"]["properties"]["lastTransitionTime"];
        assert_eq!(timestamp["type"], "string");
        assert_eq!(timestamp["format"], "date-time");
    }

    #[test]
    fn api_version_and_kind() {
        assert_eq!(MeshControlPlane::api_version(&()), "mesh.meshop.dev/v1alpha1");
        assert_eq!(MeshControlPlane::kind(&()), "MeshControlPlane");
    }

    #[test]
    fn minimal_spec_defaults_namespace() {
        let spec: MeshControlPlaneSpec = serde_json::from_value(json!({})).unwrap();
        assert_eq!(spec.namespace, DEFAULT_CONTROL_PLANE_NAMESPACE);
        assert_eq!(spec, MeshControlPlaneSpec::default());
    }

    #[test]
    fn values_preserve_arbitrary_keys() {
        let spec: MeshControlPlaneSpec = serde_json::from_value(json!({
            "version": "v3.0",
            "values": {"pilot": {"env": {"FOO": "bar"}}}
        }))
        .unwrap();
        assert_eq!(
            spec.values.get_string("pilot.env.FOO").unwrap(),
            Some("bar".to_string())
        );
    }
}
