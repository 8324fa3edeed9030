//! Shared types for IdentitySyncPolicy specifications and status
//!
//! These types are used across the CRD definitions and controller logic.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition types written to `status.conditions`
pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_DEGRADED: &str = "Degraded";
pub const CONDITION_REFERENCE_SECRET_READY: &str = "ReferenceSecretReady";

/// Condition reasons
pub const REASON_RECONCILED: &str = "Reconciled";
pub const REASON_RECONCILE_ERROR: &str = "ReconcileError";
pub const REASON_SECRET_NOT_FOUND: &str = "SecretNotFound";
pub const REASON_SECRET_AVAILABLE: &str = "SecretAvailable";
pub const REASON_SECRET_GET_FAILED: &str = "SecretGetFailed";
pub const REASON_RBAC_FORBIDDEN: &str = "RBACForbidden";
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";

/// Service account created in every target namespace
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ServiceAccountConfig {
    /// Name of the ServiceAccount (DNS-1123 label)
    pub name: String,
}

/// Secret propagated into every target namespace
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretConfig {
    /// Name of the Secret written in each target namespace
    pub name: String,
    /// Secret whose data is copied
    pub source_ref: NamespacedNameRef,
}

/// Reference to a namespaced object
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct NamespacedNameRef {
    pub name: String,
    pub namespace: String,
}

impl NamespacedNameRef {
    /// Index key in `namespace/name` form
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Tri-state status of a condition
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition for status reporting (Kubernetes convention)
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Ready", "Degraded", "ReferenceSecretReady")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: ConditionStatus,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Policy generation the condition was computed for
    #[serde(default)]
    pub observed_generation: i64,
    /// Last time the condition transitioned
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// True when the condition was written for `generation` with `status`
    pub fn is_current(&self, status: ConditionStatus, generation: i64) -> bool {
        self.status == status && self.observed_generation == generation
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}
