//! Structured configuration domains of a MeshControlPlane spec
//!
//! Every enablement flag is a [`Toggle`] rather than an `Option<bool>` so the
//! defaulting rules in the translator can match exhaustively on
//! unset / disabled / enabled.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Toggle
// =============================================================================

/// Tri-state enablement flag
///
/// Serialized as an optional boolean: absent or `null` is [`Toggle::Unset`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Toggle {
    /// Not specified by the user
    #[default]
    Unset,
    /// Explicitly false
    Disabled,
    /// Explicitly true
    Enabled,
}

impl Toggle {
    /// True only for an explicit `true`
    pub fn is_enabled(self) -> bool {
        self == Toggle::Enabled
    }

    /// True when the user did not specify a value
    pub fn is_unset(&self) -> bool {
        *self == Toggle::Unset
    }

    /// The explicit value, if any
    pub fn explicit(self) -> Option<bool> {
        self.into()
    }
}

impl From<Option<bool>> for Toggle {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Toggle::Unset,
            Some(false) => Toggle::Disabled,
            Some(true) => Toggle::Enabled,
        }
    }
}

impl From<bool> for Toggle {
    fn from(value: bool) -> Self {
        Some(value).into()
    }
}

impl From<Toggle> for Option<bool> {
    fn from(toggle: Toggle) -> Self {
        match toggle {
            Toggle::Unset => None,
            Toggle::Disabled => Some(false),
            Toggle::Enabled => Some(true),
        }
    }
}

impl JsonSchema for Toggle {
    fn schema_name() -> String {
        "Toggle".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        <Option<bool>>::json_schema(gen)
    }
}

// =============================================================================
// Cluster
// =============================================================================

/// Cluster identity, federation, and mesh expansion
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Name of this cluster within a multi-cluster mesh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Network this cluster's workloads live on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    /// Multi-cluster federation settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_cluster: Option<MultiClusterConfig>,

    /// Mesh expansion (VMs and remote workloads reaching the control plane)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_expansion: Option<MeshExpansionConfig>,
}

/// Multi-cluster federation settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultiClusterConfig {
    /// Whether multi-cluster is enabled
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub enabled: Toggle,

    /// Networks in the mesh, keyed by network name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mesh_networks: BTreeMap<String, MeshNetworkConfig>,
}

/// How to reach the workloads of one network
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshNetworkConfig {
    /// Endpoint sources belonging to the network
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<MeshEndpointConfig>,

    /// Gateways through which the network is reached
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<MeshGatewayConfig>,
}

/// Endpoint source of a mesh network
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshEndpointConfig {
    /// Registry (cluster name) whose endpoints belong to the network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_registry: Option<String>,

    /// CIDR whose endpoints belong to the network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_cidr: Option<String>,
}

/// Gateway of a mesh network
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshGatewayConfig {
    /// Fully qualified service name of the gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// Literal address of the gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Gateway port
    pub port: i32,
}

/// Mesh expansion settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshExpansionConfig {
    /// Whether mesh expansion is enabled
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub enabled: Toggle,

    /// Internal load balancer gateway used instead of the ingress gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ilb_gateway: Option<GatewayConfig>,
}

// =============================================================================
// Gateways
// =============================================================================

/// Gateway enablement and ports
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewaysConfig {
    /// Umbrella flag for all gateways
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub enabled: Toggle,

    /// Cluster-wide ingress gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_ingress: Option<ClusterIngressGatewayConfig>,

    /// Cluster-wide egress gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_egress: Option<EgressGatewayConfig>,
}

/// A gateway with its service ports
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Whether the gateway is deployed
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub enabled: Toggle,

    /// Ports exposed by the gateway service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,
}

/// Cluster ingress gateway
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIngressGatewayConfig {
    /// Whether the gateway is deployed
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub enabled: Toggle,

    /// Ports exposed by the gateway service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,

    /// Whether Kubernetes Ingress resources are served by this gateway
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub ingress_enabled: Toggle,

    /// Extra ports exposed when mesh expansion routes through ingress
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mesh_expansion_ports: Vec<ServicePort>,
}

/// Cluster egress gateway
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EgressGatewayConfig {
    /// Whether the gateway is deployed
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub enabled: Toggle,

    /// Ports exposed by the gateway service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,

    /// Networks this gateway can route to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requested_network_view: Vec<String>,
}

/// A service port
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    /// Port name
    pub name: String,

    /// Service port number
    pub port: i32,

    /// Container port, when it differs from `port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<i32>,

    /// Protocol (TCP when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl ServicePort {
    /// TCP port whose target equals its service port unless given
    pub fn tcp(name: impl Into<String>, port: i32, target_port: Option<i32>) -> Self {
        Self {
            name: name.into(),
            port,
            target_port,
            protocol: None,
        }
    }
}

// =============================================================================
// Proxy
// =============================================================================

/// Sidecar proxy settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Networking settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking: Option<ProxyNetworkingConfig>,
}

/// Proxy networking settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyNetworkingConfig {
    /// Kubernetes cluster domain (`cluster.local` when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_domain: Option<String>,

    /// DNS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<ProxyDnsConfig>,
}

/// Proxy DNS settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyDnsConfig {
    /// Extra DNS search suffixes injected into pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_suffixes: Vec<String>,

    /// Refresh rate for DNS-resolved clusters (e.g. "300s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_rate: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn toggle_round_trips_through_optional_bool() {
        let cfg: MultiClusterConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cfg.enabled, Toggle::Unset);

        let cfg: MultiClusterConfig = serde_json::from_value(json!({"enabled": false})).unwrap();
        assert_eq!(cfg.enabled, Toggle::Disabled);

        let cfg: MultiClusterConfig = serde_json::from_value(json!({"enabled": null})).unwrap();
        assert_eq!(cfg.enabled, Toggle::Unset);

        let cfg = MultiClusterConfig {
            enabled: Toggle::Enabled,
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&cfg).unwrap(), json!({"enabled": true}));
    }

    #[test]
    fn unset_toggles_are_omitted() {
        let gw = GatewayConfig::default();
        assert_eq!(serde_json::to_value(&gw).unwrap(), json!({}));
    }

    #[test]
    fn toggle_accessors() {
        assert!(Toggle::Enabled.is_enabled());
        assert!(!Toggle::Disabled.is_enabled());
        assert!(!Toggle::Unset.is_enabled());
        assert_eq!(Toggle::Disabled.explicit(), Some(false));
        assert_eq!(Toggle::Unset.explicit(), None);
        assert_eq!(Toggle::from(true), Toggle::Enabled);
    }

    #[test]
    fn cluster_config_uses_camel_case() {
        let cfg: ClusterConfig = serde_json::from_value(json!({
            "name": "east",
            "network": "net1",
            "multiCluster": {
                "enabled": true,
                "meshNetworks": {
                    "net2": {
                        "endpoints": [{"fromRegistry": "west"}],
                        "gateways": [{"address": "1.2.3.4", "port": 443}]
                    }
                }
            },
            "meshExpansion": {"ilbGateway": {"enabled": true}}
        }))
        .unwrap();

        let mc = cfg.multi_cluster.unwrap();
        assert_eq!(mc.enabled, Toggle::Enabled);
        assert_eq!(
            mc.mesh_networks["net2"].endpoints[0].from_registry.as_deref(),
            Some("west")
        );
        assert_eq!(
            cfg.mesh_expansion.unwrap().ilb_gateway.unwrap().enabled,
            Toggle::Enabled
        );
    }
}
