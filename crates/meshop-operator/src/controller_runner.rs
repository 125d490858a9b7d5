//! Controller runner - builds the MeshControlPlane controller future
//!
//! Returns boxed futures so the caller decides how to drive them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::api::DynamicObject;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};

use meshop_common::crd::MeshControlPlane;
use meshop_controller::watch::{child_resources, child_watcher_config, owner_request};
use meshop_controller::{error_policy, reconcile, Context};

/// Server-side watch timeout in seconds, kept below the client's 30s read
/// timeout so idle watches are closed by the API server first
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the MeshControlPlane controller future
///
/// Besides the control planes themselves, every child kind is watched and
/// mapped back to its owner, so edits and deletes trigger a pass.
pub fn build_control_plane_controllers(
    client: Client,
    ctx: Arc<Context>,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let control_planes: Api<MeshControlPlane> = Api::all(client.clone());

    let mut controller = Controller::new(
        control_planes,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    );
    for ar in child_resources() {
        tracing::debug!(kind = %ar.kind, "watching child kind");
        let children: Api<DynamicObject> = Api::all_with(client.clone(), &ar);
        controller = controller.watches_with(
            children,
            ar,
            child_watcher_config(WATCH_TIMEOUT_SECS),
            owner_request,
        );
    }

    tracing::info!("- MeshControlPlane controller");

    vec![Box::pin(
        controller
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("MeshControlPlane")),
    )]
}

/// Log the outcome of each pass
fn log_reconcile_result<K: Resource, E: std::fmt::Display>(
    controller_name: &'static str,
) -> impl Fn(Result<(ObjectRef<K>, Action), E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok((object, action)) => tracing::debug!(
                object = %object.name,
                ?action,
                "{} pass completed",
                controller_name
            ),
            Err(e) => tracing::warn!(error = %e, "{} pass failed", controller_name),
        }
        std::future::ready(())
    }
}
