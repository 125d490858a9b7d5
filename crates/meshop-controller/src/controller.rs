//! MeshControlPlane reconciliation
//!
//! One pass: translate the spec, merge the profile underneath, render the
//! charts, stamp and apply every child, check readiness, write status.
//! Applies are forced server-side applies of the full desired set, so any
//! pass triggered by a child watch reverts edits to managed fields and
//! recreates deleted children.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use kube::api::DynamicObject;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, instrument, warn};

use meshop_common::clock::{Clock, SystemClock};
use meshop_common::crd::{
    reasons, ConditionStatus, ConditionType, MeshControlPlane, MeshControlPlaneSpec,
    MeshControlPlaneStatus,
};
use meshop_common::events::{self, EventPublisher, NoopEventPublisher};
use meshop_common::kube_utils::{is_cluster_scoped, kind_priority};
use meshop_common::retry::RetryConfig;
use meshop_common::values::ValueTree;
use meshop_conversion::{to_values, MeshVersion};

use crate::client::KubeClient;
use crate::error::ReconcileError;
use crate::health::{check_readiness, Readiness, ReadinessTargets};
use crate::ownership::{owner_reference, stamp};
use crate::profile::ProfileLoader;
use crate::render::{ChartRenderer, Release};

// =============================================================================
// Configuration
// =============================================================================

/// Timing knobs for the reconciler
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Deadline for a single pass
    pub reconcile_timeout: Duration,
    /// Resync interval once everything is ready
    pub requeue_interval: Duration,
    /// Recheck interval while a required child is not ready
    pub not_ready_requeue: Duration,
    /// Per-object backoff after failed passes
    pub backoff: RetryConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconcile_timeout: Duration::from_secs(60),
            requeue_interval: Duration::from_secs(300),
            not_ready_requeue: Duration::from_secs(15),
            backoff: RetryConfig::default(),
        }
    }
}

// =============================================================================
// Controller context
// =============================================================================

/// Shared context for the MeshControlPlane controller
pub struct Context {
    /// Cluster access
    pub kube: Arc<dyn KubeClient>,
    /// Chart renderer
    pub renderer: Arc<dyn ChartRenderer>,
    /// Profile resolution
    pub profiles: ProfileLoader,
    /// Time source for condition timestamps
    pub clock: Arc<dyn Clock>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Timing configuration
    pub config: ControllerConfig,
    failures: DashMap<String, u32>,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(
        kube: Arc<dyn KubeClient>,
        renderer: Arc<dyn ChartRenderer>,
        profiles: ProfileLoader,
    ) -> ContextBuilder {
        ContextBuilder {
            kube,
            renderer,
            profiles,
            clock: None,
            events: None,
            config: ControllerConfig::default(),
        }
    }

    /// Count a failed pass of `name`, returning the consecutive count
    fn record_failure(&self, name: &str) -> u32 {
        let mut count = self.failures.entry(name.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn reset_failures(&self, name: &str) {
        self.failures.remove(name);
    }

    /// Consecutive failed passes of `name`
    pub fn failure_count(&self, name: &str) -> u32 {
        self.failures.get(name).map(|c| *c).unwrap_or(0)
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    kube: Arc<dyn KubeClient>,
    renderer: Arc<dyn ChartRenderer>,
    profiles: ProfileLoader,
    clock: Option<Arc<dyn Clock>>,
    events: Option<Arc<dyn EventPublisher>>,
    config: ControllerConfig,
}

impl ContextBuilder {
    /// Override the time source (tests pin it)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Publish Kubernetes Events through `events`
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Override timing configuration
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: self.kube,
            renderer: self.renderer,
            profiles: self.profiles,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            events: self.events.unwrap_or_else(|| Arc::new(NoopEventPublisher)),
            config: self.config,
            failures: DashMap::new(),
        }
    }
}

// =============================================================================
// Desired state
// =============================================================================

/// Values a control plane renders from
///
/// Translated structured fields win over the raw `values`; the profile fills
/// whatever neither sets.
pub fn desired_values(
    spec: &MeshControlPlaneSpec,
    profiles: &ProfileLoader,
) -> Result<ValueTree, ReconcileError> {
    let translated = to_values(spec)?;
    let own = ValueTree::merge(&translated, &spec.values);
    Ok(profiles.apply_profile(spec, &own)?)
}

/// Rendered, stamped children in apply order
pub fn desired_children(
    control_plane: &MeshControlPlane,
    version: MeshVersion,
    values: &ValueTree,
    renderer: &dyn ChartRenderer,
) -> Result<Vec<DynamicObject>, ReconcileError> {
    let owner = owner_reference(control_plane)?;
    let namespace = &control_plane.spec.namespace;
    let release = Release {
        name: control_plane.name_any(),
        namespace: namespace.clone(),
    };

    let mut children = renderer
        .render(version, &release, values)?
        .into_iter()
        .map(|manifest| {
            let mut child = into_child(manifest, namespace)?;
            stamp(&mut child, &owner);
            Ok(child)
        })
        .collect::<Result<Vec<_>, ReconcileError>>()?;

    children.sort_by_key(|c| {
        c.types
            .as_ref()
            .map(|t| kind_priority(&t.kind))
            .unwrap_or(u8::MAX)
    });
    Ok(children)
}

fn into_child(manifest: JsonValue, namespace: &str) -> Result<DynamicObject, ReconcileError> {
    let mut child: DynamicObject = serde_json::from_value(manifest).map_err(|e| {
        ReconcileError::Render(format!("rendered manifest is not an object: {}", e))
    })?;

    let kind = child
        .types
        .as_ref()
        .map(|t| t.kind.clone())
        .ok_or_else(|| ReconcileError::Render("rendered manifest has no apiVersion/kind".into()))?;
    if child.metadata.name.is_none() {
        return Err(ReconcileError::Render(format!(
            "rendered {} has no metadata.name",
            kind
        )));
    }

    if is_cluster_scoped(&kind) {
        child.metadata.namespace = None;
    } else if child.metadata.namespace.is_none() {
        child.metadata.namespace = Some(namespace.to_string());
    }
    Ok(child)
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Reconcile a MeshControlPlane, bounded by the configured deadline
#[instrument(skip(control_plane, ctx), fields(control_plane = %control_plane.name_any()))]
pub async fn reconcile(
    control_plane: Arc<MeshControlPlane>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let deadline = ctx.config.reconcile_timeout;
    let action = match tokio::time::timeout(deadline, reconcile_pass(&control_plane, &ctx)).await {
        Ok(result) => result?,
        Err(_) => return Err(ReconcileError::Timeout(deadline)),
    };
    ctx.reset_failures(&control_plane.name_any());
    Ok(action)
}

async fn reconcile_pass(
    control_plane: &MeshControlPlane,
    ctx: &Context,
) -> Result<Action, ReconcileError> {
    let name = control_plane.name_any();
    let current = control_plane.status.clone().unwrap_or_default();
    let mut status = current.clone();
    status.observed_generation = control_plane.metadata.generation;

    let desired = MeshVersion::parse(&control_plane.spec.version)
        .map_err(ReconcileError::from)
        .and_then(|version| {
            let values = desired_values(&control_plane.spec, &ctx.profiles)?;
            let children =
                desired_children(control_plane, version, &values, ctx.renderer.as_ref())?;
            Ok((values, children))
        });

    let (values, children) = match desired {
        Ok(desired) => desired,
        Err(e) if e.is_terminal() => {
            warn!(error = %e, "control plane spec cannot be rendered");
            status.set_condition(
                ConditionType::Reconciled,
                ConditionStatus::False,
                e.reason(),
                e.to_string(),
                ctx.clock.as_ref(),
            );
            write_status(ctx, control_plane, &current, status).await?;
            publish(
                ctx,
                control_plane,
                EventType::Warning,
                events::reasons::VALIDATION_FAILED,
                e.to_string(),
            )
            .await;
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e),
    };

    info!(children = children.len(), "applying control plane");
    for child in &children {
        if let Err(e) = ctx.kube.apply(child).await {
            let err = ReconcileError::from(e);
            if !err.is_transient() {
                status.set_condition(
                    ConditionType::Reconciled,
                    ConditionStatus::False,
                    err.reason(),
                    err.to_string(),
                    ctx.clock.as_ref(),
                );
                write_status(ctx, control_plane, &current, status).await?;
                publish(
                    ctx,
                    control_plane,
                    EventType::Warning,
                    events::reasons::APPLY_FAILED,
                    err.to_string(),
                )
                .await;
            }
            return Err(err);
        }
    }

    status.set_condition(
        ConditionType::Reconciled,
        ConditionStatus::True,
        reasons::RECONCILED,
        "",
        ctx.clock.as_ref(),
    );
    status.applied_values = values;

    let targets =
        ReadinessTargets::from_values(&control_plane.spec.namespace, &status.applied_values);
    let readiness = check_readiness(ctx.kube.as_ref(), &targets).await;
    let action = match &readiness {
        Readiness::Ready => {
            status.set_condition(
                ConditionType::Ready,
                ConditionStatus::True,
                reasons::HEALTHY,
                "",
                ctx.clock.as_ref(),
            );
            Action::requeue(ctx.config.requeue_interval)
        }
        Readiness::NotReady { reason, message } => {
            status.set_condition(
                ConditionType::Ready,
                ConditionStatus::False,
                *reason,
                message.clone(),
                ctx.clock.as_ref(),
            );
            Action::requeue(ctx.config.not_ready_requeue)
        }
        Readiness::Unknown { message } => {
            let prior = status.condition(ConditionType::Ready).status;
            status.set_condition(
                ConditionType::Ready,
                prior,
                reasons::READINESS_CHECK_FAILED,
                message.clone(),
                ctx.clock.as_ref(),
            );
            Action::requeue(ctx.config.not_ready_requeue)
        }
    };

    let generation_changed = current.observed_generation != status.observed_generation;
    let became_healthy = readiness == Readiness::Ready
        && current.state.as_deref() != Some(reasons::HEALTHY);
    write_status(ctx, control_plane, &current, status).await?;

    if generation_changed {
        publish(
            ctx,
            control_plane,
            EventType::Normal,
            events::reasons::APPLIED,
            format!("applied {} children", children.len()),
        )
        .await;
    }
    if became_healthy {
        publish(
            ctx,
            control_plane,
            EventType::Normal,
            events::reasons::HEALTHY,
            "all control plane components are ready".to_string(),
        )
        .await;
    }

    debug!(control_plane = %name, ?readiness, "reconcile pass complete");
    Ok(action)
}

/// Replace the status if it changed
///
/// Skipping identical writes keeps the control plane's own watch quiet once
/// it has converged.
async fn write_status(
    ctx: &Context,
    control_plane: &MeshControlPlane,
    current: &MeshControlPlaneStatus,
    mut status: MeshControlPlaneStatus,
) -> Result<(), ReconcileError> {
    status.refresh_state();
    if &status == current {
        return Ok(());
    }
    ctx.kube.replace_status(control_plane, &status).await?;
    debug!(state = ?status.state, "status updated");
    Ok(())
}

async fn publish(
    ctx: &Context,
    control_plane: &MeshControlPlane,
    type_: EventType,
    reason: &str,
    note: String,
) {
    ctx.events
        .publish(
            &control_plane.object_ref(&()),
            type_,
            reason,
            events::actions::RECONCILE,
            Some(note),
        )
        .await;
}

/// Error policy: exponential backoff per control plane
pub fn error_policy(
    control_plane: Arc<MeshControlPlane>,
    error: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    let name = control_plane.name_any();
    let attempt = ctx.record_failure(&name);
    let delay = ctx.config.backoff.delay_for_attempt(attempt);

    if error.is_transient() {
        warn!(control_plane = %name, attempt, ?delay, error = %error, "reconcile failed, retrying");
    } else {
        error!(control_plane = %name, attempt, ?delay, error = %error, "reconcile failed");
    }
    Action::requeue(delay)
}
