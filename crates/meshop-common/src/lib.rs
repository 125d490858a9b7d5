//! Common types for meshop: CRDs, value trees, errors, and utilities

#![deny(missing_docs)]

pub mod clock;
pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;
pub mod values;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for every server-side apply and status write
pub const FIELD_MANAGER: &str = "meshop-operator";

/// Label stamped on every rendered child
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "meshop";

/// Label naming the owning MeshControlPlane on every rendered child
pub const OWNER_LABEL: &str = "mesh.meshop.dev/control-plane";
