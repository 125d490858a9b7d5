//! Proxy networking and DNS

use meshop_common::crd::{MeshControlPlaneSpec, ProxyConfig, ProxyDnsConfig, ProxyNetworkingConfig};
use meshop_common::values::ValueTree;
use meshop_common::Result;

use crate::non_default;
use crate::overrides::Bookkeeping;

const CLUSTER_DOMAIN_PATH: &str = "global.proxy.clusterDomain";
const SEARCH_SUFFIXES_PATH: &str = "global.podDNSSearchNamespaces";
const DNS_REFRESH_RATE_PATH: &str = "global.proxy.dnsRefreshRate";

pub(crate) fn populate_proxy_values(
    spec: &MeshControlPlaneSpec,
    values: &mut ValueTree,
) -> Result<()> {
    let Some(networking) = spec.proxy.as_ref().and_then(|p| p.networking.as_ref()) else {
        return Ok(());
    };

    if let Some(domain) = &networking.cluster_domain {
        values.set(CLUSTER_DOMAIN_PATH, domain.as_str())?;
    }
    if let Some(dns) = &networking.dns {
        if !dns.search_suffixes.is_empty() {
            values.set(SEARCH_SUFFIXES_PATH, dns.search_suffixes.clone())?;
        }
        if let Some(rate) = &dns.refresh_rate {
            values.set(DNS_REFRESH_RATE_PATH, rate.as_str())?;
        }
    }
    Ok(())
}

pub(crate) fn populate_proxy_config(
    values: &mut ValueTree,
    record: &Bookkeeping,
    out: &mut MeshControlPlaneSpec,
) -> Result<()> {
    let cluster_domain = values.get_and_remove_string(CLUSTER_DOMAIN_PATH)?;

    let mut search_suffixes = values
        .get_and_remove_string_list(SEARCH_SUFFIXES_PATH)?
        .unwrap_or_default();
    for added in &record.added_search_suffixes {
        if let Some(index) = search_suffixes.iter().position(|s| s == added) {
            search_suffixes.remove(index);
        }
    }

    let dns = ProxyDnsConfig {
        search_suffixes,
        refresh_rate: values.get_and_remove_string(DNS_REFRESH_RATE_PATH)?,
    };

    out.proxy = non_default(ProxyConfig {
        networking: non_default(ProxyNetworkingConfig {
            cluster_domain,
            dns: non_default(dns),
        }),
    });
    Ok(())
}
