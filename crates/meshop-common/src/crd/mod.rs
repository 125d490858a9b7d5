//! Custom Resource Definitions for meshop

mod config;
mod control_plane;
mod status;

pub use config::{
    ClusterConfig, ClusterIngressGatewayConfig, EgressGatewayConfig, GatewayConfig,
    GatewaysConfig, MeshEndpointConfig, MeshExpansionConfig, MeshGatewayConfig,
    MeshNetworkConfig, MultiClusterConfig, ProxyConfig, ProxyDnsConfig, ProxyNetworkingConfig,
    ServicePort, Toggle,
};
pub use control_plane::{MeshControlPlane, MeshControlPlaneSpec, DEFAULT_CONTROL_PLANE_NAMESPACE};
pub use status::{
    derive_state, reasons, Condition, ConditionStatus, ConditionType, MeshControlPlaneStatus,
};
