//! Error types for the meshop operator
//!
//! Errors carry the control plane name and the field or profile involved so
//! that a failed reconcile can be traced back to the offending input.

use thiserror::Error;

use crate::values::MergeTypeError;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for meshop operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid user input in a MeshControlPlane spec or profile reference
    #[error("validation error for {control_plane}: {message}")]
    Validation {
        /// Name of the control plane with invalid configuration
        control_plane: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.profile")
        field: Option<String>,
    },

    /// Named profile does not exist in the resource directory
    #[error("profile '{profile}' not found for version {version}")]
    ProfileNotFound {
        /// Requested profile name
        profile: String,
        /// Control plane version whose profile directory was searched
        version: String,
    },

    /// A value tree held a different kind than expected
    #[error(transparent)]
    MergeType(#[from] MergeTypeError),

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Chart rendering error
    #[error("render error [{template}]: {message}")]
    Render {
        /// Template file that failed
        template: String,
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "watcher")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    ///
    /// For simple validation errors without control plane context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            control_plane: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with control plane context
    pub fn validation_for(control_plane: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            control_plane: control_plane.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with control plane context and field path
    pub fn validation_for_field(
        control_plane: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            control_plane: control_plane.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a profile-not-found error
    pub fn profile_not_found(profile: impl Into<String>, version: impl Into<String>) -> Self {
        Self::ProfileNotFound {
            profile: profile.into(),
            version: version.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a render error for a template file
    pub fn render(template: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Render {
            template: template.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Input errors (validation, missing profile, type mismatch, bad
    /// templates) need a user fix. Kubernetes errors retry unless they are
    /// a 4xx other than 404/409/429.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => is_retryable_kube(source),
            Error::Validation { .. } => false,
            Error::ProfileNotFound { .. } => false,
            Error::MergeType(_) => false,
            Error::Serialization { .. } => false,
            Error::Render { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the control plane name if this error is associated with one
    pub fn control_plane(&self) -> Option<&str> {
        match self {
            Error::Validation { control_plane, .. } => Some(control_plane),
            _ => None,
        }
    }
}

/// Whether a kube error is worth retrying
///
/// Conflicts, throttling, and not-found (delete races) are transient, as are
/// server and transport errors. Other 4xx responses are permanent.
pub fn is_retryable_kube(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(ae) => {
            !(400..500).contains(&ae.code) || matches!(ae.code, 404 | 409 | 429)
        }
        _ => true,
    }
}
