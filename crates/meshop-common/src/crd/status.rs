//! MeshControlPlane status: conditions and the derived state
//!
//! Conditions are keyed by [`ConditionType`], so a status never holds two of
//! the same type. A condition's transition time only moves when its status
//! flips, and is truncated to whole seconds.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::values::ValueTree;

/// Condition reasons written by the controller
pub mod reasons {
    /// Everything converged and all required children are ready
    pub const HEALTHY: &str = "Healthy";
    /// Children were rendered and applied
    pub const RECONCILED: &str = "Reconciled";
    /// Applying children failed
    pub const RECONCILE_ERROR: &str = "ReconcileError";
    /// Spec or profile reference is invalid
    pub const VALIDATION_ERROR: &str = "ValidationError";
    /// Referenced profile does not exist
    pub const PROFILE_NOT_FOUND: &str = "ProfileNotFound";
    /// A value tree held a wrongly typed value
    pub const MERGE_TYPE_ERROR: &str = "MergeTypeError";
    /// Chart templates failed to render
    pub const RENDER_ERROR: &str = "RenderError";
    /// The istiod Deployment is missing or has unready replicas
    pub const ISTIOD_NOT_READY: &str = "IstiodNotReady";
    /// The istiod Deployment was scaled to zero
    pub const ISTIOD_SCALED_TO_ZERO: &str = "IstiodScaledToZero";
    /// The CNI DaemonSet has unready pods
    pub const CNI_NOT_READY: &str = "CNINotReady";
    /// The sidecar injector webhook is missing
    pub const WEBHOOK_NOT_READY: &str = "WebhookNotReady";
    /// Some children could not be read
    pub const READINESS_CHECK_FAILED: &str = "ReadinessCheckFailed";
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kinds of condition a MeshControlPlane reports
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionType {
    /// Children have been rendered and applied from the current spec
    Reconciled,
    /// Required children report ready
    Ready,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconciled => write!(f, "Reconciled"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status changed
    #[serde(
        rename = "lastTransitionTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Placeholder for a condition that has never been observed
    pub fn unknown(type_: ConditionType) -> Self {
        Self {
            type_,
            status: ConditionStatus::Unknown,
            reason: String::new(),
            message: String::new(),
            last_transition_time: None,
        }
    }

    /// Whether the condition holds
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Aggregate state from the Reconciled and Ready conditions
///
/// A reconcile failure always wins over readiness.
pub fn derive_state(reconciled: &Condition, ready: &Condition) -> String {
    if !reconciled.is_true() {
        reconciled.reason.clone()
    } else if !ready.is_true() {
        ready.reason.clone()
    } else {
        reasons::HEALTHY.to_string()
    }
}

/// Status for a MeshControlPlane
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshControlPlaneStatus {
    /// Generation of the spec last processed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Current conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Value tree the children were last rendered from
    #[serde(default, skip_serializing_if = "ValueTree::is_empty")]
    pub applied_values: ValueTree,

    /// Derived state (Healthy, or the reason of the failing condition)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl MeshControlPlaneStatus {
    /// Condition of the given type, or an Unknown placeholder when absent
    pub fn condition(&self, type_: ConditionType) -> Condition {
        self.conditions
            .iter()
            .find(|c| c.type_ == type_)
            .cloned()
            .unwrap_or_else(|| Condition::unknown(type_))
    }

    /// Record an observation for `type_`
    ///
    /// Keeps the previous transition time when the status is unchanged,
    /// otherwise stamps the clock's time truncated to the second.
    pub fn set_condition(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        clock: &dyn Clock,
    ) {
        let previous = self.conditions.iter().position(|c| c.type_ == type_);

        let last_transition_time = match previous.map(|i| &self.conditions[i]) {
            Some(prior) if prior.status == status && prior.last_transition_time.is_some() => {
                prior.last_transition_time
            }
            _ => Some(clock.now().trunc_subsecs(0)),
        };

        let condition = Condition {
            type_,
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time,
        };

        match previous {
            Some(i) => self.conditions[i] = condition,
            None => self.conditions.push(condition),
        }
    }

    /// Recompute `state` from the current conditions
    pub fn refresh_state(&mut self) {
        let state = derive_state(
            &self.condition(ConditionType::Reconciled),
            &self.condition(ConditionType::Ready),
        );
        self.state = Some(state);
    }
}
