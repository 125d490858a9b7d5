//! meshop operator - keeps service mesh control planes converged

mod config;
mod controller_runner;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResourceExt, ResourceExt};

use meshop_common::crd::MeshControlPlane;
use meshop_common::events::KubeEventPublisher;
use meshop_common::retry::{retry_with_backoff, RetryConfig};
use meshop_common::telemetry::init_telemetry;
use meshop_common::FIELD_MANAGER;
use meshop_controller::{Context, KubeClientImpl, ProfileLoader, TemplateDirRenderer};

use crate::config::OperatorConfig;

const CRD_INSTALL_ATTEMPTS: u32 = 5;

/// meshop - reconciles MeshControlPlane resources into running control planes
#[derive(Parser, Debug)]
#[command(name = "meshop-operator", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: OperatorConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Installs the MeshControlPlane CRD, then watches control planes and
    /// every child they render.
    Controller,

    /// Print the MeshControlPlane CRD as YAML and exit
    Crd,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Crd) = cli.command {
        let crd = serde_yaml::to_string(&MeshControlPlane::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(cli.config.telemetry_config())?;
    run_controller(cli.config).await
}

/// Install or update the MeshControlPlane CRD with server-side apply
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd = MeshControlPlane::crd();
    let name = crd.name_any();
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!(crd = %name, "Installing CRD");
    retry_with_backoff(
        &RetryConfig::with_max_attempts(CRD_INSTALL_ATTEMPTS),
        "install MeshControlPlane CRD",
        || {
            let crds = crds.clone();
            let crd = crd.clone();
            let name = name.clone();
            let params = params.clone();
            async move { crds.patch(&name, &params, &Patch::Apply(&crd)).await }
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install MeshControlPlane CRD: {}", e))?;

    Ok(())
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    tracing::info!(
        resource_dir = %config.resource_dir.display(),
        "meshop controller starting"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crd_installed(&client).await?;

    let ctx = Context::builder(
        Arc::new(KubeClientImpl::new(client.clone())),
        Arc::new(TemplateDirRenderer::new(config.resource_dir.clone())),
        ProfileLoader::new(config.resource_dir.clone()),
    )
    .events(Arc::new(KubeEventPublisher::new(client.clone(), FIELD_MANAGER)))
    .config(config.controller_config())
    .build();

    let controllers = controller_runner::build_control_plane_controllers(client, Arc::new(ctx));
    futures::future::join_all(controllers).await;

    tracing::info!("meshop controller stopped");
    Ok(())
}
