//! Kubernetes resource builders for IdentitySyncPolicy targets
//!
//! This module creates and manages the ServiceAccount and Secret written into
//! each target namespace of a policy.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use tracing::debug;

use crate::crd::IdentitySyncPolicy;
use crate::error::Result;

/// Value of `app.kubernetes.io/name` on every managed object
pub const APP_NAME: &str = "identity-sync-policy";

pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_POLICY_NAME: &str = "identitysyncpolicy.platform.lapacek-labs.org/policy-name";
pub const LABEL_POLICY_UID: &str = "identitysyncpolicy.platform.lapacek-labs.org/policy-uid";

/// Get the standard labels for a policy's managed resources
pub fn standard_labels(policy: &IdentitySyncPolicy) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_NAME.to_string(), APP_NAME.to_string());
    labels.insert(LABEL_MANAGED_BY.to_string(), format!("{}-operator", APP_NAME));
    labels.insert(LABEL_POLICY_NAME.to_string(), policy.name_any());
    labels.insert(
        LABEL_POLICY_UID.to_string(),
        policy.metadata.uid.clone().unwrap_or_default(),
    );
    labels
}

/// Create an OwnerReference so targets are collected with their policy
pub fn owner_reference(policy: &IdentitySyncPolicy) -> OwnerReference {
    OwnerReference {
        api_version: IdentitySyncPolicy::api_version(&()).to_string(),
        kind: IdentitySyncPolicy::kind(&()).to_string(),
        name: policy.name_any(),
        uid: policy.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn managed_metadata(policy: &IdentitySyncPolicy, name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(standard_labels(policy)),
        owner_references: Some(vec![owner_reference(policy)]),
        ..Default::default()
    }
}

// ============================================================================
// ServiceAccount
// ============================================================================

/// Ensure the policy's ServiceAccount exists in `namespace`
pub async fn ensure_service_account(
    client: &Client,
    policy: &IdentitySyncPolicy,
    namespace: &str,
    field_manager: &str,
) -> Result<()> {
    let api: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    let name = &policy.spec.service_account.name;

    let service_account = build_service_account(policy, namespace);

    api.patch(
        name,
        &PatchParams::apply(field_manager).force(),
        &Patch::Apply(&service_account),
    )
    .await?;

    debug!("ServiceAccount {}/{} applied", namespace, name);
    Ok(())
}

pub fn build_service_account(policy: &IdentitySyncPolicy, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: managed_metadata(policy, &policy.spec.service_account.name, namespace),
        ..Default::default()
    }
}

// ============================================================================
// Secret
// ============================================================================

/// Ensure the policy's Secret in `namespace` carries the source data
pub async fn ensure_secret(
    client: &Client,
    policy: &IdentitySyncPolicy,
    namespace: &str,
    source: &Secret,
    field_manager: &str,
) -> Result<()> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let name = &policy.spec.secret.name;

    let secret = build_secret(policy, namespace, source);

    api.patch(
        name,
        &PatchParams::apply(field_manager).force(),
        &Patch::Apply(&secret),
    )
    .await?;

    debug!("Secret {}/{} applied", namespace, name);
    Ok(())
}

pub fn build_secret(policy: &IdentitySyncPolicy, namespace: &str, source: &Secret) -> Secret {
    Secret {
        metadata: managed_metadata(policy, &policy.spec.secret.name, namespace),
        data: source.data.clone(),
        type_: Some(
            source
                .type_
                .clone()
                .unwrap_or_else(|| "Opaque".to_string()),
        ),
        ..Default::default()
    }
}
