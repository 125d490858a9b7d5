//! Reconcile error taxonomy
//!
//! Every failure of a pass lands in one of these variants. Terminal variants
//! need the user to change something; transient ones are retried with
//! backoff and never touch the Reconciled condition.

use std::time::Duration;

use thiserror::Error;

use meshop_common::crd::reasons;
use meshop_common::error::is_retryable_kube;
use meshop_common::values::MergeTypeError;

/// Error returned by a reconcile pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Spec or profile reference is invalid
    #[error("validation failed: {0}")]
    Validation(String),

    /// Requested profile does not exist
    #[error("{0}")]
    ProfileNotFound(String),

    /// A value had the wrong kind during translation
    #[error(transparent)]
    MergeType(#[from] MergeTypeError),

    /// Charts could not be rendered into child manifests
    #[error("render failed: {0}")]
    Render(String),

    /// The API server permanently rejected a child or status write
    #[error("apply failed: {0}")]
    Apply(String),

    /// Conflict, throttling, server or transport failure
    #[error("transient error: {0}")]
    Transient(String),

    /// The pass did not finish within its deadline
    #[error("reconcile timed out after {0:?}")]
    Timeout(Duration),
}

impl ReconcileError {
    /// Condition reason reported for this error
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::Validation(_) => reasons::VALIDATION_ERROR,
            ReconcileError::ProfileNotFound(_) => reasons::PROFILE_NOT_FOUND,
            ReconcileError::MergeType(_) => reasons::MERGE_TYPE_ERROR,
            ReconcileError::Render(_) => reasons::RENDER_ERROR,
            ReconcileError::Apply(_)
            | ReconcileError::Transient(_)
            | ReconcileError::Timeout(_) => reasons::RECONCILE_ERROR,
        }
    }

    /// Whether retrying without a spec change is pointless
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReconcileError::Validation(_)
                | ReconcileError::ProfileNotFound(_)
                | ReconcileError::MergeType(_)
                | ReconcileError::Render(_)
        )
    }

    /// Whether the error is expected to clear up on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReconcileError::Transient(_) | ReconcileError::Timeout(_)
        )
    }
}

impl From<kube::Error> for ReconcileError {
    fn from(err: kube::Error) -> Self {
        if is_retryable_kube(&err) {
            ReconcileError::Transient(err.to_string())
        } else {
            ReconcileError::Apply(err.to_string())
        }
    }
}

impl From<meshop_common::Error> for ReconcileError {
    fn from(err: meshop_common::Error) -> Self {
        use meshop_common::Error;

        match err {
            Error::Kube { source } => source.into(),
            Error::MergeType(e) => ReconcileError::MergeType(e),
            e @ Error::Validation { .. } => ReconcileError::Validation(e.to_string()),
            e @ Error::ProfileNotFound { .. } => ReconcileError::ProfileNotFound(e.to_string()),
            e @ (Error::Render { .. } | Error::Serialization { .. }) => {
                ReconcileError::Render(e.to_string())
            }
            e @ Error::Internal { .. } => ReconcileError::Transient(e.to_string()),
        }
    }
}
