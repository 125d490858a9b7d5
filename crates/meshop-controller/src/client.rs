//! Cluster API access used by the reconciler
//!
//! The trait is what reconcile talks to; tests substitute a mock or an
//! in-memory fake.

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use meshop_common::crd::{MeshControlPlane, MeshControlPlaneStatus};
use meshop_common::kube_utils::{build_api_resource, is_cluster_scoped};
use meshop_common::{Error, FIELD_MANAGER};

/// Trait abstracting Kubernetes client operations for MeshControlPlane
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Server-side apply a rendered child, taking ownership of every field
    /// it sets
    async fn apply(&self, object: &DynamicObject) -> Result<(), Error>;

    /// Replace the status subresource of a MeshControlPlane
    ///
    /// The write carries the observed resourceVersion, so a concurrent
    /// change fails with 409 Conflict.
    async fn replace_status(
        &self,
        control_plane: &MeshControlPlane,
        status: &MeshControlPlaneStatus,
    ) -> Result<(), Error>;

    /// Get a Deployment, `None` when it does not exist
    async fn get_deployment(&self, namespace: &str, name: &str)
        -> Result<Option<Deployment>, Error>;

    /// Get a DaemonSet, `None` when it does not exist
    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>, Error>;

    /// Get a cluster-scoped MutatingWebhookConfiguration
    async fn get_mutating_webhook(
        &self,
        name: &str,
    ) -> Result<Option<MutatingWebhookConfiguration>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn apply(&self, object: &DynamicObject) -> Result<(), Error> {
        let types = object.types.as_ref().ok_or_else(|| {
            Error::serialization("rendered object is missing apiVersion or kind")
        })?;
        let name = object.metadata.name.as_deref().ok_or_else(|| {
            Error::serialization_for_kind(&types.kind, "rendered object is missing metadata.name")
        })?;
        let ar = build_api_resource(&types.api_version, &types.kind);

        let api: Api<DynamicObject> = match object.metadata.namespace.as_deref() {
            Some(ns) if !is_cluster_scoped(&types.kind) => {
                Api::namespaced_with(self.client.clone(), ns, &ar)
            }
            _ => Api::all_with(self.client.clone(), &ar),
        };

        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(object),
        )
        .await?;

        debug!(kind = %types.kind, name = %name, "applied child");
        Ok(())
    }

    async fn replace_status(
        &self,
        control_plane: &MeshControlPlane,
        status: &MeshControlPlaneStatus,
    ) -> Result<(), Error> {
        let api: Api<MeshControlPlane> = Api::all(self.client.clone());

        let mut updated = control_plane.clone();
        updated.status = Some(status.clone());
        let data = serde_json::to_vec(&updated)
            .map_err(|e| Error::serialization_for_kind("MeshControlPlane", e.to_string()))?;

        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.replace_status(&control_plane.name_any(), &params, data)
            .await?;
        Ok(())
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_daemon_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DaemonSet>, Error> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_mutating_webhook(
        &self,
        name: &str,
    ) -> Result<Option<MutatingWebhookConfiguration>, Error> {
        let api: Api<MutatingWebhookConfiguration> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }
}
