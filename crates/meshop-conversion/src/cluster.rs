//! Cluster identity, multi-cluster federation, and mesh expansion
//!
//! Forward translation here also reaches into the gateway and proxy domains
//! of the working spec: federation needs ingress and egress gateways, the
//! expansion ports, and the `global` DNS search suffixes. Every such change
//! is recorded so [`populate_cluster_config`] and its siblings can undo it.

use std::collections::BTreeMap;

use meshop_common::crd::{
    ClusterConfig, ClusterIngressGatewayConfig, GatewayConfig, GatewaysConfig,
    MeshControlPlaneSpec, MeshEndpointConfig, MeshExpansionConfig, MeshGatewayConfig,
    MeshNetworkConfig, MultiClusterConfig, ServicePort, Toggle,
};
use meshop_common::values::ValueTree;
use meshop_common::Result;

use crate::gateways::{set_gateway_values, take_gateway, ILB_PATH};
use crate::overrides::{
    keys, Bookkeeping, OverrideRecord, ADDED_EXPANSION_PORTS_PATH, ADDED_LOCAL_NETWORK_PATH,
    ADDED_SEARCH_SUFFIXES_PATH, OVERRIDES_PATH, USE_ILB_PATH,
};
use crate::versions::MeshVersion;
use crate::{decode, encode, non_default, strip_ports};

const CLUSTER_NAME_PATH: &str = "global.multiCluster.clusterName";
const NETWORK_PATH: &str = "global.network";
const MULTI_CLUSTER_ENABLED_PATH: &str = "global.multiCluster.enabled";
const MESH_NETWORKS_PATH: &str = "global.meshNetworks";
const MESH_EXPANSION_ENABLED_PATH: &str = "global.meshExpansion.enabled";

const SEARCH_SUFFIX_GLOBAL: &str = "global";
const CLUSTER_DOMAIN_DEFAULT: &str = "cluster.local";
const LOCAL_NETWORK_GATEWAY: &str = "istio-ingressgateway";
const LOCAL_NETWORK_GATEWAY_PORT: i32 = 443;
const EXTERNAL_NETWORK: &str = "external";

/// Namespace-templated `global` search suffix, resolved by the injector
pub fn namespace_search_suffix(namespace: &str) -> String {
    format!(
        "{{{{ valueOrDefault .DeploymentMeta.Namespace \"{}\" }}}}.global",
        namespace
    )
}

fn is_namespace_template(suffix: &str) -> bool {
    // the template is wrapped in {{ }}, so the marker can never sit at 0
    suffix
        .find(".DeploymentMeta.Namespace")
        .is_some_and(|index| index > 0)
}

fn local_network_service(namespace: &str, cluster_domain: &str) -> String {
    format!(
        "{}.{}.svc.{}",
        LOCAL_NETWORK_GATEWAY, namespace, cluster_domain
    )
}

fn local_mesh_network(
    cluster_name: &str,
    namespace: &str,
    cluster_domain: &str,
) -> MeshNetworkConfig {
    MeshNetworkConfig {
        endpoints: vec![MeshEndpointConfig {
            from_registry: Some(cluster_name.to_string()),
            from_cidr: None,
        }],
        gateways: vec![MeshGatewayConfig {
            service: Some(local_network_service(namespace, cluster_domain)),
            address: None,
            port: LOCAL_NETWORK_GATEWAY_PORT,
        }],
    }
}

/// Emit cluster values, applying the cross-field defaults to `spec`
///
/// `spec` is the caller's working copy; gateway and proxy changes made here
/// are picked up by the gateway and proxy translators afterwards.
pub(crate) fn populate_cluster_values(
    spec: &mut MeshControlPlaneSpec,
    version: MeshVersion,
    values: &mut ValueTree,
) -> Result<()> {
    let namespace = spec.namespace.clone();
    let cluster_domain = spec
        .proxy
        .as_ref()
        .and_then(|p| p.networking.as_ref())
        .and_then(|n| n.cluster_domain.clone())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| CLUSTER_DOMAIN_DEFAULT.to_string());

    let mut cluster = spec.cluster.clone().unwrap_or_default();
    let mut overrides = OverrideRecord::default();

    let cluster_name = cluster.name.clone().filter(|n| !n.is_empty());
    let network = cluster.network.clone().filter(|n| !n.is_empty());
    if let Some(name) = &cluster_name {
        values.set(CLUSTER_NAME_PATH, name.as_str())?;
    }
    if let Some(network) = &network {
        values.set(NETWORK_PATH, network.as_str())?;
    }

    let multi_cluster_enabled = match cluster.multi_cluster.as_mut() {
        None => {
            overrides.defaulted(keys::MULTI_CLUSTER_ENABLED);
            false
        }
        Some(multi_cluster) => {
            let enabled = match multi_cluster.enabled.explicit() {
                Some(enabled) => enabled,
                None => {
                    overrides.defaulted(keys::MULTI_CLUSTER_ENABLED);
                    false
                }
            };
            if let (Some(name), Some(network)) = (&cluster_name, &network) {
                if !multi_cluster.mesh_networks.contains_key(network) {
                    multi_cluster.mesh_networks.insert(
                        network.clone(),
                        local_mesh_network(name, &namespace, &cluster_domain),
                    );
                    values.set(ADDED_LOCAL_NETWORK_PATH, network.as_str())?;
                }
            }
            if !multi_cluster.mesh_networks.is_empty() {
                values.set(MESH_NETWORKS_PATH, encode(&multi_cluster.mesh_networks)?)?;
            }
            enabled
        }
    };
    values.set(MULTI_CLUSTER_ENABLED_PATH, multi_cluster_enabled)?;

    if multi_cluster_enabled {
        let gateways = spec.gateways.get_or_insert_with(Default::default);
        force_federation(&mut cluster, gateways, &mut overrides);
    }

    populate_mesh_expansion_values(spec, &mut cluster, version, values, &mut overrides)?;

    if multi_cluster_enabled {
        let added = inject_search_suffixes(spec);
        if !added.is_empty() {
            values.set(ADDED_SEARCH_SUFFIXES_PATH, added)?;
        }
    }

    if !overrides.is_empty() {
        values.set(OVERRIDES_PATH, overrides.to_node())?;
    }
    Ok(())
}

/// Multi-cluster needs mesh expansion and both cluster gateways
fn force_federation(
    cluster: &mut ClusterConfig,
    gateways: &mut GatewaysConfig,
    overrides: &mut OverrideRecord,
) {
    let expansion = cluster.mesh_expansion.get_or_insert_with(Default::default);
    force_on(&mut expansion.enabled, keys::EXPANSION_ENABLED, overrides);

    let egress = gateways.cluster_egress.get_or_insert_with(Default::default);
    force_on(&mut egress.enabled, keys::EGRESS_ENABLED, overrides);
    force_on(&mut gateways.enabled, keys::GATEWAYS_ENABLED, overrides);

    if !egress
        .requested_network_view
        .iter()
        .any(|n| n == EXTERNAL_NETWORK)
    {
        overrides.explicit(keys::ADDED_EXTERNAL, true);
        egress
            .requested_network_view
            .push(EXTERNAL_NETWORK.to_string());
    }
}

fn force_on(toggle: &mut Toggle, key: &str, overrides: &mut OverrideRecord) {
    if !toggle.is_enabled() {
        overrides.record(key, *toggle);
        *toggle = Toggle::Enabled;
    }
}

fn populate_mesh_expansion_values(
    spec: &mut MeshControlPlaneSpec,
    cluster: &mut ClusterConfig,
    version: MeshVersion,
    values: &mut ValueTree,
    overrides: &mut OverrideRecord,
) -> Result<()> {
    let Some(expansion) = cluster.mesh_expansion.as_mut() else {
        overrides.defaulted(keys::EXPANSION_ENABLED);
        values.set(MESH_EXPANSION_ENABLED_PATH, false)?;
        values.set(USE_ILB_PATH, false)?;
        return Ok(());
    };

    let enabled = match expansion.enabled.explicit() {
        Some(enabled) => enabled,
        None => {
            overrides.defaulted(keys::EXPANSION_ENABLED);
            false
        }
    };
    values.set(MESH_EXPANSION_ENABLED_PATH, enabled)?;

    let use_ilb = enabled
        && expansion
            .ilb_gateway
            .as_ref()
            .is_some_and(|ilb| ilb.enabled.is_enabled());

    let mut added_ports = Vec::new();
    if enabled {
        let ports = version.expansion_ports();
        if use_ilb {
            if let Some(ilb) = expansion.ilb_gateway.as_mut() {
                added_ports = add_expansion_ports(&mut ilb.ports, &ports);
            }
        } else {
            let gateways = spec.gateways.get_or_insert_with(Default::default);
            let ingress = force_cluster_ingress(gateways, overrides);
            added_ports = add_expansion_ports(&mut ingress.mesh_expansion_ports, &ports);

            if expansion.ilb_gateway.is_none() {
                overrides.defaulted(keys::ILB_ENABLED);
                expansion.ilb_gateway = Some(GatewayConfig {
                    enabled: Toggle::Disabled,
                    ..Default::default()
                });
            } else if expansion
                .ilb_gateway
                .as_ref()
                .is_some_and(|ilb| ilb.enabled.is_unset())
            {
                overrides.defaulted(keys::ILB_ENABLED);
            }
        }
    }

    values.set(USE_ILB_PATH, use_ilb)?;
    if !added_ports.is_empty() {
        values.set(ADDED_EXPANSION_PORTS_PATH, added_ports)?;
    }
    if let Some(ilb) = &expansion.ilb_gateway {
        set_gateway_values(values, ILB_PATH, ilb)?;
    }
    Ok(())
}

/// Expansion traffic without an ILB enters through cluster ingress
fn force_cluster_ingress<'a>(
    gateways: &'a mut GatewaysConfig,
    overrides: &mut OverrideRecord,
) -> &'a mut ClusterIngressGatewayConfig {
    let ingress = gateways.cluster_ingress.get_or_insert_with(Default::default);
    force_on(&mut ingress.enabled, keys::INGRESS_ENABLED, overrides);
    force_on(&mut ingress.ingress_enabled, keys::K8S_INGRESS_ENABLED, overrides);
    ingress
}

/// Append each candidate whose port number is not already in `target`
///
/// Returns the port numbers that were appended.
pub fn add_expansion_ports(target: &mut Vec<ServicePort>, candidates: &[ServicePort]) -> Vec<i64> {
    let mut added = Vec::new();
    for candidate in candidates {
        if target.iter().any(|existing| existing.port == candidate.port) {
            continue;
        }
        target.push(candidate.clone());
        added.push(i64::from(candidate.port));
    }
    added
}

/// Insert the `global` search suffixes into the proxy DNS config
///
/// The namespace template goes right after an existing bare `global`, or
/// first when there is none; a missing bare `global` is always prepended.
/// Returns what was inserted, which is empty on a second call.
pub fn inject_search_suffixes(spec: &mut MeshControlPlaneSpec) -> Vec<String> {
    let mut suffixes = spec
        .proxy
        .as_ref()
        .and_then(|p| p.networking.as_ref())
        .and_then(|n| n.dns.as_ref())
        .map(|d| d.search_suffixes.clone())
        .unwrap_or_default();

    let global_index = suffixes.iter().rposition(|s| s == SEARCH_SUFFIX_GLOBAL);
    let has_namespace_template = suffixes.iter().any(|s| is_namespace_template(s));

    let mut added = Vec::new();
    if !has_namespace_template {
        let namespace_suffix = namespace_search_suffix(&spec.namespace);
        match global_index {
            Some(index) => suffixes.insert(index + 1, namespace_suffix.clone()),
            None => suffixes.insert(0, namespace_suffix.clone()),
        }
        added.push(namespace_suffix);
    }
    if global_index.is_none() {
        suffixes.insert(0, SEARCH_SUFFIX_GLOBAL.to_string());
        added.push(SEARCH_SUFFIX_GLOBAL.to_string());
    }

    if !added.is_empty() {
        let dns = spec
            .proxy
            .get_or_insert_with(Default::default)
            .networking
            .get_or_insert_with(Default::default)
            .dns
            .get_or_insert_with(Default::default);
        dns.search_suffixes = suffixes;
    }
    added
}

/// Rebuild the cluster config, undoing forward defaults
pub(crate) fn populate_cluster_config(
    values: &mut ValueTree,
    record: &Bookkeeping,
    out: &mut MeshControlPlaneSpec,
) -> Result<()> {
    let overrides = &record.overrides;

    let name = values.get_and_remove_string(CLUSTER_NAME_PATH)?;
    let network = values.get_and_remove_string(NETWORK_PATH)?;

    let mut mesh_networks: BTreeMap<String, MeshNetworkConfig> =
        match values.get_and_remove(MESH_NETWORKS_PATH)? {
            Some(node) if !node.is_null() => decode(MESH_NETWORKS_PATH, "mesh network map", node)?,
            _ => BTreeMap::new(),
        };
    if let Some(added) = &record.added_local_network {
        mesh_networks.remove(added);
    }
    let multi_cluster = MultiClusterConfig {
        enabled: overrides.restore(
            keys::MULTI_CLUSTER_ENABLED,
            values.get_and_remove_bool(MULTI_CLUSTER_ENABLED_PATH)?,
        ),
        mesh_networks,
    };

    let expansion_enabled = values.get_and_remove_bool(MESH_EXPANSION_ENABLED_PATH)?;
    let ilb_gateway = match take_gateway(values, ILB_PATH)? {
        Some(mut ilb) => {
            ilb.enabled = overrides.restore(keys::ILB_ENABLED, ilb.enabled.explicit());
            if record.use_ilb {
                strip_ports(&mut ilb.ports, &record.added_expansion_ports);
            }
            non_default(ilb)
        }
        None => None,
    };
    let mesh_expansion = MeshExpansionConfig {
        enabled: overrides.restore(keys::EXPANSION_ENABLED, expansion_enabled),
        ilb_gateway,
    };

    out.cluster = non_default(ClusterConfig {
        name,
        network,
        multi_cluster: non_default(multi_cluster),
        mesh_expansion: non_default(mesh_expansion),
    });
    Ok(())
}
