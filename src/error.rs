//! Central error types for the identity sync operator
//!
//! Uses `thiserror` for ergonomic, type-safe error handling with
//! automatic `Display` and `Error` trait implementations.

use thiserror::Error;

use crate::errclass::{self, Classification, ErrorKind, ErrorReason, NotFoundPolicy};

/// Central error type for the identity sync operator
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Operator configuration error (bind failures, bad flags)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Policy spec validation error
    #[error("Policy validation error: {0}")]
    ValidationError(String),

    /// Resource not found in the cluster
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    /// A per-target operation ran past its deadline
    #[error("Operation timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    /// The operation was aborted before it completed
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Writing the policy status failed
    #[error("status patch failed ({kind}/{reason}): {source}")]
    StatusPatch {
        kind: ErrorKind,
        reason: ErrorReason,
        #[source]
        source: kube::Error,
    },
}

/// Result type alias for operator operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Classify this error, treating missing objects as a dependency that may still appear
    pub fn classify(&self) -> Classification {
        errclass::classify(self, NotFoundPolicy::AsTransient)
    }

    /// Check if this error type should trigger a prompt retry
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.classify().kind,
            ErrorKind::Transient | ErrorKind::Conflict
        )
    }

    /// Convert to a human-readable message for status updates
    pub fn status_message(&self) -> String {
        match self {
            Error::KubeError(kube::Error::Api(e)) => {
                format!("Kubernetes error ({}): {}", e.reason, e.message)
            }
            Error::KubeError(e) => format!("Kubernetes error: {}", e),
            Error::ValidationError(msg) => format!("Validation failed: {}", msg),
            Error::NotFound {
                kind,
                name,
                namespace,
            } => format!("{} {}/{} not found", kind, namespace, name),
            Error::StatusPatch { reason, .. } => format!("Status update failed: {}", reason),
            _ => self.to_string(),
        }
    }
}
