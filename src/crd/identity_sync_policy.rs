//! IdentitySyncPolicy Custom Resource Definition
//!
//! An IdentitySyncPolicy copies one source Secret, together with a named
//! ServiceAccount, into every namespace listed in `targetNamespaces`.

use std::collections::BTreeSet;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, SecretConfig, ServiceAccountConfig};

/// Upper bound on the number of target namespaces per policy
pub const MAX_TARGET_NAMESPACES: usize = 50;

/// The IdentitySyncPolicy CRD describes a fanout of identity material.
///
/// # Example
///
/// ```yaml
/// apiVersion: identity.lapacek-labs.org/v1alpha1
/// kind: IdentitySyncPolicy
/// metadata:
///   name: ci-runner
/// spec:
///   targetNamespaces: ["team-a", "team-b"]
///   serviceAccount:
///     name: ci-runner
///   secret:
///     name: ci-runner-token
///     sourceRef:
///       name: ci-runner-token
///       namespace: platform
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "identity.lapacek-labs.org",
    version = "v1alpha1",
    kind = "IdentitySyncPolicy",
    status = "IdentitySyncPolicyStatus",
    shortname = "isp",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySyncPolicySpec {
    /// Namespaces to sync into (1 to 50 DNS-1123 labels, no duplicates)
    pub target_namespaces: Vec<String>,

    /// ServiceAccount created in every target namespace
    pub service_account: ServiceAccountConfig,

    /// Secret copied into every target namespace
    pub secret: SecretConfig,
}

impl IdentitySyncPolicySpec {
    /// Validate the spec against the constraints the schema advertises
    pub fn validate(&self) -> Result<(), String> {
        if self.target_namespaces.is_empty() {
            return Err("targetNamespaces must contain at least one namespace".to_string());
        }
        if self.target_namespaces.len() > MAX_TARGET_NAMESPACES {
            return Err(format!(
                "targetNamespaces must not contain more than {} namespaces",
                MAX_TARGET_NAMESPACES
            ));
        }

        let mut seen = BTreeSet::new();
        for (i, ns) in self.target_namespaces.iter().enumerate() {
            if !is_dns_label(ns) {
                return Err(format!(
                    "targetNamespaces[{}] '{}' is not a valid DNS-1123 label",
                    i, ns
                ));
            }
            if !seen.insert(ns.as_str()) {
                return Err(format!("targetNamespaces[{}] '{}' is listed twice", i, ns));
            }
        }

        check_label("serviceAccount.name", &self.service_account.name)?;
        check_label("secret.name", &self.secret.name)?;
        check_label("secret.sourceRef.name", &self.secret.source_ref.name)?;
        check_label(
            "secret.sourceRef.namespace",
            &self.secret.source_ref.namespace,
        )?;

        Ok(())
    }
}

fn check_label(field: &str, value: &str) -> Result<(), String> {
    if is_dns_label(value) {
        Ok(())
    } else {
        Err(format!("{} '{}' is not a valid DNS-1123 label", field, value))
    }
}

/// `^[a-z0-9]([-a-z0-9]*[a-z0-9])?$`, at most 63 characters
pub fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= 63
                && alnum(first)
                && alnum(last)
                && bytes.iter().all(|b| alnum(b) || *b == b'-')
        }
        _ => false,
    }
}

/// Status subresource for IdentitySyncPolicy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySyncPolicyStatus {
    /// Conditions ordered by type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// SHA-256 of the source Secret data last applied successfully
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub observed_source_secret_hash: String,
}
