//! Bookkeeping written by forward translation so reverse can undo it
//!
//! Forward translation synthesizes defaults (multi-cluster off, gateways
//! forced on, extra ports and DNS suffixes). Each synthesized decision is
//! written next to the values so reverse translation can tell a user's
//! explicit `false` from a default, and strip anything it added.

use std::collections::BTreeMap;

use meshop_common::crd::Toggle;
use meshop_common::values::{MergeTypeError, Node, Scalar, ValueTree};
use meshop_common::Result;

/// Where the override record lives in the value tree
pub const OVERRIDES_PATH: &str = "global.multiCluster.multiClusterOverrides";
/// Network name whose mesh network entry was generated
pub const ADDED_LOCAL_NETWORK_PATH: &str = "global.multiCluster.addedLocalNetwork";
/// DNS search suffixes injected for multi-cluster
pub const ADDED_SEARCH_SUFFIXES_PATH: &str = "global.multiCluster.addedSearchSuffixes";
/// Port numbers appended to the expansion gateway
pub const ADDED_EXPANSION_PORTS_PATH: &str = "global.multiCluster.addedExpansionPorts";
/// Whether expansion traffic uses the ILB gateway instead of ingress
pub const USE_ILB_PATH: &str = "global.meshExpansion.useILB";

/// Override record keys
pub mod keys {
    /// `cluster.multiCluster.enabled`
    pub const MULTI_CLUSTER_ENABLED: &str = "multiClusterEnabled";
    /// `cluster.meshExpansion.enabled`
    pub const EXPANSION_ENABLED: &str = "expansionEnabled";
    /// `gateways.clusterEgress.enabled`
    pub const EGRESS_ENABLED: &str = "egressEnabled";
    /// `gateways.enabled`
    pub const GATEWAYS_ENABLED: &str = "gatewaysEnabled";
    /// `gateways.clusterIngress.enabled`
    pub const INGRESS_ENABLED: &str = "ingressEnabled";
    /// `gateways.clusterIngress.ingressEnabled`
    pub const K8S_INGRESS_ENABLED: &str = "k8sIngressEnabled";
    /// `cluster.meshExpansion.ilbGateway.enabled`
    pub const ILB_ENABLED: &str = "ilbEnabled";
    /// "external" appended to the egress requested network view
    pub const ADDED_EXTERNAL: &str = "addedExternal";
}

/// What a field held before forward translation overrode it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverrideEntry {
    /// The field was unset and received a default
    Defaulted,
    /// The field held this explicit value
    Explicit(bool),
}

/// Field key to prior value, for every field forward translation changed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OverrideRecord {
    entries: BTreeMap<String, OverrideEntry>,
}

impl OverrideRecord {
    /// Record that `key` was defaulted. The first record of a key wins.
    pub fn defaulted(&mut self, key: &str) {
        self.entries
            .entry(key.to_string())
            .or_insert(OverrideEntry::Defaulted);
    }

    /// Record that `key` held `prior`. The first record of a key wins.
    pub fn explicit(&mut self, key: &str, prior: bool) {
        self.entries
            .entry(key.to_string())
            .or_insert(OverrideEntry::Explicit(prior));
    }

    /// Record the prior state of a toggle that is about to be forced
    pub fn record(&mut self, key: &str, prior: Toggle) {
        match prior.explicit() {
            None => self.defaulted(key),
            Some(b) => self.explicit(key, b),
        }
    }

    /// Entry for `key`
    pub fn get(&self, key: &str) -> Option<OverrideEntry> {
        self.entries.get(key).copied()
    }

    /// Whether `key` was recorded at all
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The user's original toggle, given the value found in the tree
    pub fn restore(&self, key: &str, found: Option<bool>) -> Toggle {
        match self.get(key) {
            Some(OverrideEntry::Defaulted) => Toggle::Unset,
            Some(OverrideEntry::Explicit(prior)) => prior.into(),
            None => found.into(),
        }
    }

    /// Tree form: `Defaulted` is null, `Explicit` is the bool
    pub fn to_node(&self) -> Node {
        Node::Map(
            self.entries
                .iter()
                .map(|(key, entry)| {
                    let node = match entry {
                        OverrideEntry::Defaulted => Node::Scalar(Scalar::Null),
                        OverrideEntry::Explicit(b) => Node::from(*b),
                    };
                    (key.clone(), node)
                })
                .collect(),
        )
    }

    fn from_map(map: BTreeMap<String, Node>) -> std::result::Result<Self, MergeTypeError> {
        let entries = map
            .into_iter()
            .map(|(key, node)| {
                let entry = match node {
                    Node::Scalar(Scalar::Null) => OverrideEntry::Defaulted,
                    Node::Scalar(Scalar::Bool(b)) => OverrideEntry::Explicit(b),
                    other => {
                        return Err(MergeTypeError::new(
                            format!("{}.{}", OVERRIDES_PATH, key),
                            "bool or null",
                            other.kind(),
                        ))
                    }
                };
                Ok((key, entry))
            })
            .collect::<std::result::Result<_, _>>()?;
        Ok(Self { entries })
    }
}

/// All bookkeeping a forward pass leaves in the tree
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bookkeeping {
    /// Overridden fields
    pub overrides: OverrideRecord,
    /// Network whose mesh network entry was generated
    pub added_local_network: Option<String>,
    /// DNS suffixes injected into the proxy config
    pub added_search_suffixes: Vec<String>,
    /// Port numbers appended to the expansion gateway
    pub added_expansion_ports: Vec<i64>,
    /// Expansion ports went to the ILB gateway rather than ingress
    pub use_ilb: bool,
}

impl Bookkeeping {
    /// Remove every bookkeeping path from `values`
    pub fn take_from(values: &mut ValueTree) -> Result<Self> {
        let overrides = match values.get_and_remove_map(OVERRIDES_PATH)? {
            Some(map) => OverrideRecord::from_map(map)?,
            None => OverrideRecord::default(),
        };
        let added_expansion_ports = match values.get_and_remove_list(ADDED_EXPANSION_PORTS_PATH)? {
            Some(items) => items
                .iter()
                .map(|n| {
                    n.as_i64().ok_or_else(|| {
                        MergeTypeError::new(ADDED_EXPANSION_PORTS_PATH, "int", n.kind())
                    })
                })
                .collect::<std::result::Result<_, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            overrides,
            added_local_network: values.get_and_remove_string(ADDED_LOCAL_NETWORK_PATH)?,
            added_search_suffixes: values
                .get_and_remove_string_list(ADDED_SEARCH_SUFFIXES_PATH)?
                .unwrap_or_default(),
            added_expansion_ports,
            use_ilb: values.get_and_remove_bool(USE_ILB_PATH)?.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_record_wins() {
        let mut record = OverrideRecord::default();
        record.defaulted(keys::EXPANSION_ENABLED);
        record.explicit(keys::EXPANSION_ENABLED, false);
        assert_eq!(
            record.get(keys::EXPANSION_ENABLED),
            Some(OverrideEntry::Defaulted)
        );
    }

    #[test]
    fn restore_prefers_recorded_prior() {
        let mut record = OverrideRecord::default();
        record.record(keys::EGRESS_ENABLED, Toggle::Disabled);
        record.record(keys::GATEWAYS_ENABLED, Toggle::Unset);

        assert_eq!(record.restore(keys::EGRESS_ENABLED, Some(true)), Toggle::Disabled);
        assert_eq!(record.restore(keys::GATEWAYS_ENABLED, Some(true)), Toggle::Unset);
        assert_eq!(record.restore(keys::INGRESS_ENABLED, Some(true)), Toggle::Enabled);
        assert_eq!(record.restore(keys::INGRESS_ENABLED, None), Toggle::Unset);
    }

    #[test]
    fn record_survives_the_tree() {
        let mut record = OverrideRecord::default();
        record.defaulted(keys::MULTI_CLUSTER_ENABLED);
        record.explicit(keys::ADDED_EXTERNAL, true);

        let mut values = ValueTree::new();
        values.set(OVERRIDES_PATH, record.to_node()).unwrap();
        assert_eq!(
            values.to_json()["global"]["multiCluster"]["multiClusterOverrides"],
            json!({"multiClusterEnabled": null, "addedExternal": true})
        );

        let taken = Bookkeeping::take_from(&mut values).unwrap();
        assert_eq!(taken.overrides, record);
        assert!(values.is_empty());
    }

    #[test]
    fn malformed_override_is_a_type_error() {
        let mut values: ValueTree = serde_json::from_value(json!({
            "global": {"multiCluster": {"multiClusterOverrides": {"egressEnabled": "yes"}}}
        }))
        .unwrap();
        let err = Bookkeeping::take_from(&mut values).unwrap_err();
        assert!(err.to_string().contains("egressEnabled"));
    }

    #[test]
    fn take_reads_all_bookkeeping() {
        let mut values: ValueTree = serde_json::from_value(json!({
            "global": {
                "multiCluster": {
                    "addedLocalNetwork": "net1",
                    "addedSearchSuffixes": ["global"],
                    "addedExpansionPorts": [15012]
                },
                "meshExpansion": {"useILB": true, "enabled": true}
            }
        }))
        .unwrap();

        let taken = Bookkeeping::take_from(&mut values).unwrap();
        assert_eq!(taken.added_local_network.as_deref(), Some("net1"));
        assert_eq!(taken.added_search_suffixes, vec!["global"]);
        assert_eq!(taken.added_expansion_ports, vec![15012]);
        assert!(taken.use_ilb);
        assert_eq!(
            values.to_json(),
            json!({"global": {"meshExpansion": {"enabled": true}}})
        );
    }
}
