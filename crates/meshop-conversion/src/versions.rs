//! Supported control plane versions

use std::fmt;
use std::str::FromStr;

use meshop_common::crd::ServicePort;
use meshop_common::Error;

/// A supported control plane version
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MeshVersion {
    /// v2.4
    V2_4,
    /// v2.5
    V2_5,
    /// v2.6
    V2_6,
    /// v3.0
    V3_0,
}

impl MeshVersion {
    /// Version used when a spec leaves `version` empty
    pub const LATEST: MeshVersion = MeshVersion::V3_0;

    /// Every supported version, oldest first
    pub const ALL: [MeshVersion; 4] = [
        MeshVersion::V2_4,
        MeshVersion::V2_5,
        MeshVersion::V2_6,
        MeshVersion::V3_0,
    ];

    /// Parse a spec version; empty means [`MeshVersion::LATEST`]
    pub fn parse(version: &str) -> Result<Self, Error> {
        if version.is_empty() {
            return Ok(Self::LATEST);
        }
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == version)
            .ok_or_else(|| {
                Error::validation_for_field(
                    meshop_common::error::UNKNOWN_CONTEXT,
                    "spec.version",
                    format!("unsupported version '{}'", version),
                )
            })
    }

    /// Canonical string form, also the resource directory name
    pub fn as_str(&self) -> &'static str {
        match self {
            MeshVersion::V2_4 => "v2.4",
            MeshVersion::V2_5 => "v2.5",
            MeshVersion::V2_6 => "v2.6",
            MeshVersion::V3_0 => "v3.0",
        }
    }

    /// Ports a mesh expansion gateway must expose for this version
    ///
    /// From v3.0 on, DNS proxying moved into the sidecar, so only istiod's
    /// XDS port is needed.
    pub fn expansion_ports(&self) -> Vec<ServicePort> {
        let istiod = ServicePort::tcp("tcp-istiod", 15012, None);
        match self {
            MeshVersion::V2_4 | MeshVersion::V2_5 | MeshVersion::V2_6 => {
                vec![istiod, ServicePort::tcp("tcp-dns-tls", 853, Some(8853))]
            }
            MeshVersion::V3_0 => vec![istiod],
        }
    }
}

impl fmt::Display for MeshVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeshVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_version_is_latest() {
        assert_eq!(MeshVersion::parse("").unwrap(), MeshVersion::V3_0);
    }

    #[test]
    fn known_versions_parse() {
        for v in MeshVersion::ALL {
            assert_eq!(v.as_str().parse::<MeshVersion>().unwrap(), v);
        }
    }

    #[test]
    fn unknown_version_is_a_validation_error() {
        match MeshVersion::parse("v1.1") {
            Err(Error::Validation { field, message, .. }) => {
                assert_eq!(field.as_deref(), Some("spec.version"));
                assert!(message.contains("v1.1"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn expansion_ports_by_version() {
        let v2 = MeshVersion::V2_6.expansion_ports();
        assert_eq!(v2.len(), 2);
        assert_eq!(v2[1].port, 853);
        assert_eq!(v2[1].target_port, Some(8853));

        let v3 = MeshVersion::V3_0.expansion_ports();
        assert_eq!(v3.len(), 1);
        assert_eq!(v3[0].name, "tcp-istiod");
        assert_eq!(v3[0].port, 15012);
    }
}
