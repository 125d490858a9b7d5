//! MeshControlPlane controller
//!
//! Turns a MeshControlPlane into a rendered, owned, continuously reconciled
//! set of control plane children.
//!
//! # Modules
//!
//! - [`controller`] - reconcile loop, context, error policy
//! - [`profile`] - profile resolution under the resource directory
//! - [`render`] - chart rendering into child manifests
//! - [`ownership`] - owner references on children
//! - [`health`] - readiness of istiod, CNI, and the injector webhook
//! - [`watch`] - child watches mapped back to the owning control plane
//! - [`client`] - cluster access behind a mockable trait

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod error;
pub mod health;
pub mod ownership;
pub mod profile;
pub mod render;
pub mod watch;

pub use client::{KubeClient, KubeClientImpl};
pub use controller::{error_policy, reconcile, Context, ControllerConfig};
pub use error::ReconcileError;
pub use profile::ProfileLoader;
pub use render::{ChartRenderer, TemplateDirRenderer};
