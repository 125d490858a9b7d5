//! Gateway enablement and ports

use meshop_common::crd::{
    ClusterIngressGatewayConfig, EgressGatewayConfig, GatewayConfig, GatewaysConfig,
    MeshControlPlaneSpec, ServicePort, Toggle,
};
use meshop_common::values::ValueTree;
use meshop_common::Result;

use crate::overrides::{keys, Bookkeeping};
use crate::{decode, encode, non_default, strip_ports};

const GATEWAYS_ENABLED_PATH: &str = "gateways.enabled";
const INGRESS_PATH: &str = "gateways.istio-ingressgateway";
const EGRESS_PATH: &str = "gateways.istio-egressgateway";
const K8S_INGRESS_ENABLED_PATH: &str = "global.k8sIngress.enabled";
pub(crate) const ILB_PATH: &str = "gateways.istio-ilbgateway";

const EXTERNAL_NETWORK: &str = "external";

fn field(path: &str, name: &str) -> String {
    format!("{}.{}", path, name)
}

fn set_toggle(values: &mut ValueTree, path: &str, toggle: Toggle) -> Result<()> {
    if let Some(enabled) = toggle.explicit() {
        values.set(path, enabled)?;
    }
    Ok(())
}

fn set_ports(values: &mut ValueTree, path: &str, ports: &[ServicePort]) -> Result<()> {
    if !ports.is_empty() {
        values.set(path, encode(&ports)?)?;
    }
    Ok(())
}

fn take_ports(values: &mut ValueTree, path: &str) -> Result<Vec<ServicePort>> {
    match values.get_and_remove(path)? {
        Some(node) if !node.is_null() => decode(path, "port list", node),
        _ => Ok(Vec::new()),
    }
}

/// Emit a plain gateway under `path`
pub(crate) fn set_gateway_values(
    values: &mut ValueTree,
    path: &str,
    gateway: &GatewayConfig,
) -> Result<()> {
    set_toggle(values, &field(path, "enabled"), gateway.enabled)?;
    set_ports(values, &field(path, "ports"), &gateway.ports)
}

/// Consume a plain gateway under `path`, if any of it is there
pub(crate) fn take_gateway(values: &mut ValueTree, path: &str) -> Result<Option<GatewayConfig>> {
    if values.get(path)?.is_none() {
        return Ok(None);
    }
    Ok(Some(GatewayConfig {
        enabled: values.get_and_remove_bool(&field(path, "enabled"))?.into(),
        ports: take_ports(values, &field(path, "ports"))?,
    }))
}

/// Emit gateway values from the (already defaulted) working spec
pub(crate) fn populate_gateway_values(
    spec: &MeshControlPlaneSpec,
    values: &mut ValueTree,
) -> Result<()> {
    let Some(gateways) = &spec.gateways else {
        return Ok(());
    };

    set_toggle(values, GATEWAYS_ENABLED_PATH, gateways.enabled)?;

    if let Some(ingress) = &gateways.cluster_ingress {
        set_toggle(values, &field(INGRESS_PATH, "enabled"), ingress.enabled)?;
        set_ports(values, &field(INGRESS_PATH, "ports"), &ingress.ports)?;
        set_ports(
            values,
            &field(INGRESS_PATH, "meshExpansionPorts"),
            &ingress.mesh_expansion_ports,
        )?;
        set_toggle(values, K8S_INGRESS_ENABLED_PATH, ingress.ingress_enabled)?;
    }

    if let Some(egress) = &gateways.cluster_egress {
        set_toggle(values, &field(EGRESS_PATH, "enabled"), egress.enabled)?;
        set_ports(values, &field(EGRESS_PATH, "ports"), &egress.ports)?;
        if !egress.requested_network_view.is_empty() {
            values.set(
                &field(EGRESS_PATH, "requestedNetworkView"),
                egress.requested_network_view.clone(),
            )?;
        }
    }
    Ok(())
}

/// Rebuild the gateways config, undoing forced enablement and added items
pub(crate) fn populate_gateways_config(
    values: &mut ValueTree,
    record: &Bookkeeping,
    out: &mut MeshControlPlaneSpec,
) -> Result<()> {
    let overrides = &record.overrides;

    let mut ingress = ClusterIngressGatewayConfig {
        enabled: overrides.restore(
            keys::INGRESS_ENABLED,
            values.get_and_remove_bool(&field(INGRESS_PATH, "enabled"))?,
        ),
        ports: take_ports(values, &field(INGRESS_PATH, "ports"))?,
        ingress_enabled: overrides.restore(
            keys::K8S_INGRESS_ENABLED,
            values.get_and_remove_bool(K8S_INGRESS_ENABLED_PATH)?,
        ),
        mesh_expansion_ports: take_ports(values, &field(INGRESS_PATH, "meshExpansionPorts"))?,
    };
    if !record.use_ilb {
        strip_ports(&mut ingress.mesh_expansion_ports, &record.added_expansion_ports);
    }

    let mut egress = EgressGatewayConfig {
        enabled: overrides.restore(
            keys::EGRESS_ENABLED,
            values.get_and_remove_bool(&field(EGRESS_PATH, "enabled"))?,
        ),
        ports: take_ports(values, &field(EGRESS_PATH, "ports"))?,
        requested_network_view: values
            .get_and_remove_string_list(&field(EGRESS_PATH, "requestedNetworkView"))?
            .unwrap_or_default(),
    };
    if overrides.contains(keys::ADDED_EXTERNAL) {
        if let Some(index) = egress
            .requested_network_view
            .iter()
            .rposition(|n| n == EXTERNAL_NETWORK)
        {
            egress.requested_network_view.remove(index);
        }
    }

    out.gateways = non_default(GatewaysConfig {
        enabled: overrides.restore(
            keys::GATEWAYS_ENABLED,
            values.get_and_remove_bool(GATEWAYS_ENABLED_PATH)?,
        ),
        cluster_ingress: non_default(ingress),
        cluster_egress: non_default(egress),
    });
    Ok(())
}
