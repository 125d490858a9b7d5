//! Translation between the structured MeshControlPlane spec and chart values
//!
//! [`to_values`] walks the cluster, gateway, and proxy domains of a spec and
//! emits the value paths the charts read, applying the cross-field defaults
//! multi-cluster federation needs. [`from_values`] consumes those paths again
//! and restores the spec the user wrote, using the bookkeeping forward
//! translation leaves in the tree.
//!
//! The raw `spec.values` tree is not part of either direction; callers merge
//! it with the translated tree themselves.

#![deny(missing_docs)]

mod cluster;
mod gateways;
pub mod overrides;
mod proxy;
pub mod versions;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use meshop_common::crd::{MeshControlPlaneSpec, ServicePort};
use meshop_common::values::{MergeTypeError, Node, ValueTree};
use meshop_common::{Error, Result};

pub use cluster::{add_expansion_ports, inject_search_suffixes, namespace_search_suffix};
pub use overrides::{Bookkeeping, OverrideEntry, OverrideRecord};
pub use versions::MeshVersion;

const ISTIO_NAMESPACE_PATH: &str = "global.istioNamespace";

/// Translate the structured domains of `spec` into chart values
pub fn to_values(spec: &MeshControlPlaneSpec) -> Result<ValueTree> {
    let version = MeshVersion::parse(&spec.version)?;
    let mut working = spec.clone();
    let mut values = ValueTree::new();

    values.set(ISTIO_NAMESPACE_PATH, working.namespace.as_str())?;
    cluster::populate_cluster_values(&mut working, version, &mut values)?;
    gateways::populate_gateway_values(&working, &mut values)?;
    proxy::populate_proxy_values(&working, &mut values)?;

    debug!(
        version = %version,
        namespace = %working.namespace,
        "translated spec to values"
    );
    Ok(values)
}

/// Rebuild a spec from chart values
///
/// Every path [`to_values`] writes is consumed; whatever remains ends up in
/// the returned spec's `values`. Version and profile are not part of the
/// tree and come back empty.
pub fn from_values(mut values: ValueTree) -> Result<MeshControlPlaneSpec> {
    let record = Bookkeeping::take_from(&mut values)?;
    let mut out = MeshControlPlaneSpec::default();

    if let Some(namespace) = values.get_and_remove_string(ISTIO_NAMESPACE_PATH)? {
        out.namespace = namespace;
    }
    gateways::populate_gateways_config(&mut values, &record, &mut out)?;
    proxy::populate_proxy_config(&mut values, &record, &mut out)?;
    cluster::populate_cluster_config(&mut values, &record, &mut out)?;

    out.values = values;
    Ok(out)
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Node> {
    serde_json::to_value(value)
        .map(Node::from)
        .map_err(|e| Error::serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(
    path: &str,
    expected: &'static str,
    node: Node,
) -> Result<T> {
    let found = node.kind();
    serde_json::from_value(serde_json::Value::from(node))
        .map_err(|_| MergeTypeError::new(path, expected, found).into())
}

/// `None` for a config equal to its default
pub(crate) fn non_default<T: Default + PartialEq>(value: T) -> Option<T> {
    if value == T::default() {
        None
    } else {
        Some(value)
    }
}

/// Drop the ports forward translation appended
pub(crate) fn strip_ports(ports: &mut Vec<ServicePort>, added: &[i64]) {
    ports.retain(|p| !added.contains(&i64::from(p.port)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshop_common::crd::Toggle;
    use serde_json::json;

    fn spec(value: serde_json::Value) -> MeshControlPlaneSpec {
        serde_json::from_value(value).unwrap()
    }

    fn round_trip(original: &MeshControlPlaneSpec) -> MeshControlPlaneSpec {
        from_values(to_values(original).unwrap()).unwrap()
    }

    // ==========================================================================
    // Story Tests: Round Trips
    // ==========================================================================

    #[test]
    fn empty_spec_round_trips() {
        let original = MeshControlPlaneSpec::default();
        assert_eq!(round_trip(&original), original);
    }

    /// Story: Every synthesized default is undone on the way back
    ///
    /// Multi-cluster forces expansion, both gateways, the external network,
    /// expansion ports, a local mesh network, and DNS suffixes. None of that
    /// may leak into the spec rebuilt from the values.
    #[test]
    fn story_federated_spec_round_trips() {
        let original = spec(json!({
            "cluster": {
                "name": "east",
                "network": "n1",
                "multiCluster": {"enabled": true},
                "meshExpansion": {"enabled": false}
            },
            "gateways": {"clusterEgress": {"requestedNetworkView": ["net2"]}},
            "proxy": {
                "networking": {
                    "clusterDomain": "corp.example",
                    "dns": {"searchSuffixes": ["svc.corp"]}
                }
            }
        }));

        let values = to_values(&original).unwrap();
        assert_eq!(values.get_bool("gateways.enabled").unwrap(), Some(true));

        let restored = from_values(values).unwrap();
        assert_eq!(restored, original);
        assert!(restored.values.is_empty());
    }

    #[test]
    fn ilb_spec_round_trips() {
        let original = spec(json!({
            "version": "",
            "namespace": "mesh-system",
            "cluster": {
                "meshExpansion": {
                    "enabled": true,
                    "ilbGateway": {"enabled": true, "ports": [{"name": "tcp", "port": 31400}]}
                }
            }
        }));
        assert_eq!(round_trip(&original), original);
    }

    #[test]
    fn explicit_toggles_round_trip() {
        let original = spec(json!({
            "cluster": {"multiCluster": {"enabled": false}},
            "gateways": {
                "enabled": false,
                "clusterIngress": {"enabled": false, "ingressEnabled": true}
            }
        }));
        let restored = round_trip(&original);
        assert_eq!(restored, original);
        assert_eq!(
            restored.cluster.unwrap().multi_cluster.unwrap().enabled,
            Toggle::Disabled
        );
    }

    #[test]
    fn forward_is_deterministic() {
        let original = spec(json!({"cluster": {"multiCluster": {"enabled": true}}}));
        assert_eq!(to_values(&original).unwrap(), to_values(&original).unwrap());
    }

    #[test]
    fn forward_does_not_touch_the_input() {
        let original = spec(json!({"cluster": {"multiCluster": {"enabled": true}}}));
        let before = original.clone();
        to_values(&original).unwrap();
        assert_eq!(original, before);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = to_values(&spec(json!({"version": "v9.9"}))).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn unrelated_values_are_left_over() {
        let values: ValueTree = serde_json::from_value(json!({
            "pilot": {"replicaCount": 2},
            "global": {"network": "n1", "hub": "quay.io/mesh"}
        }))
        .unwrap();
        let restored = from_values(values).unwrap();
        assert_eq!(
            restored.values.to_json(),
            json!({"pilot": {"replicaCount": 2}, "global": {"hub": "quay.io/mesh"}})
        );
        assert_eq!(restored.cluster.unwrap().network.as_deref(), Some("n1"));
    }
}
