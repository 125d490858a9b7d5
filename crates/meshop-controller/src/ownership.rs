//! Owner references on rendered children
//!
//! Every child carries exactly one controller reference to the
//! MeshControlPlane it was rendered from. Garbage collection cascades
//! deletes through it, and watch events are mapped back to the owner with
//! it, for cluster-scoped children as much as namespaced ones.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};

use meshop_common::crd::MeshControlPlane;
use meshop_common::{Error, Result, MANAGED_BY_LABEL, MANAGED_BY_VALUE, OWNER_LABEL};

/// How a child's owner reference relates to a given control plane
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnershipState {
    /// Points at the control plane's current identity
    Current,
    /// Points at an earlier control plane of the same name
    Stale,
    /// Controlled by something else
    Foreign,
    /// No controller reference at all
    Missing,
}

/// Controller reference for children of `control_plane`
///
/// Blocks owner deletion until garbage collection has removed the child.
pub fn owner_reference(control_plane: &MeshControlPlane) -> Result<OwnerReference> {
    let uid = control_plane.uid().ok_or_else(|| {
        Error::internal_with_context(
            "ownership",
            format!(
                "MeshControlPlane {} has no uid yet",
                control_plane.name_any()
            ),
        )
    })?;

    Ok(OwnerReference {
        api_version: MeshControlPlane::api_version(&()).to_string(),
        kind: MeshControlPlane::kind(&()).to_string(),
        name: control_plane.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Make `owner` the only owner reference of `child` and label it
///
/// Any earlier reference is replaced, so children of a recreated control
/// plane follow the new identity.
pub fn stamp(child: &mut DynamicObject, owner: &OwnerReference) {
    child.metadata.owner_references = Some(vec![owner.clone()]);

    let labels = child.metadata.labels.get_or_insert_with(Default::default);
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(OWNER_LABEL.to_string(), owner.name.clone());
}

/// Classify `meta`'s controller reference against `owner`
pub fn ownership_state(meta: &ObjectMeta, owner: &OwnerReference) -> OwnershipState {
    let Some(controller) = controller_of(meta) else {
        return OwnershipState::Missing;
    };

    let same_kind = controller.api_version == owner.api_version && controller.kind == owner.kind;
    if !same_kind || controller.name != owner.name {
        OwnershipState::Foreign
    } else if controller.uid == owner.uid {
        OwnershipState::Current
    } else {
        OwnershipState::Stale
    }
}

/// Name of the MeshControlPlane controlling `meta`, if any
///
/// Used by child watches to route events to the owner. The reference is
/// checked explicitly rather than trusting namespaces, because cluster
/// scoped children have none.
pub fn owning_control_plane(meta: &ObjectMeta) -> Option<String> {
    let controller = controller_of(meta)?;
    let api_version = MeshControlPlane::api_version(&());
    let kind = MeshControlPlane::kind(&());
    (controller.api_version == api_version && controller.kind == kind)
        .then(|| controller.name.clone())
}

fn controller_of(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true))
}
