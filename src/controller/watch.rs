//! Source Secret watching
//!
//! Secrets are mapped back to the policies that reference them. A
//! [`SecretChangeFilter`] drops updates that leave the Secret data alone, so
//! label or annotation churn does not trigger a pass.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::crd::IdentitySyncPolicy;

/// Stable hash of `Secret.data`: keys in sorted order, each followed by its bytes
pub fn secret_data_hash(secret: &Secret) -> String {
    let mut hasher = Sha256::new();
    if let Some(data) = &secret.data {
        // BTreeMap iterates in key order
        for (key, value) in data {
            hasher.update(key.as_bytes());
            hasher.update(&value.0);
        }
    }
    format!("{:x}", hasher.finalize())
}

/// `namespace/name` key of a Secret
pub fn secret_key(secret: &Secret) -> String {
    format!(
        "{}/{}",
        secret.namespace().unwrap_or_default(),
        secret.name_any()
    )
}

/// Policies whose source reference points at `secret`
pub fn policies_for_secret(
    policies: &[Arc<IdentitySyncPolicy>],
    secret: &Secret,
) -> Vec<ObjectRef<IdentitySyncPolicy>> {
    let key = secret_key(secret);
    let refs: Vec<_> = policies
        .iter()
        .filter(|p| source_index_key(p).as_deref() == Some(key.as_str()))
        .map(|p| ObjectRef::from_obj(p.as_ref()))
        .collect();

    debug!(secret = %key, count = refs.len(), "mapped secret to policies");
    refs
}

/// Index key of a policy's source Secret, if the reference is complete
pub fn source_index_key(policy: &IdentitySyncPolicy) -> Option<String> {
    let source = &policy.spec.secret.source_ref;
    if source.name.is_empty() || source.namespace.is_empty() {
        return None;
    }
    Some(source.key())
}

#[derive(Debug, Default)]
struct Seen {
    hashes: HashMap<String, String>,
    /// Keys delivered since the watcher started a re-list
    relisted: Option<HashSet<String>>,
}

/// Remembers the last data hash seen per Secret
#[derive(Debug, Default)]
pub struct SecretChangeFilter {
    seen: Mutex<Seen>,
}

impl SecretChangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Seen> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an applied Secret; true when it is new or its data changed
    pub fn observe_apply(&self, secret: &Secret) -> bool {
        let key = secret_key(secret);
        let hash = secret_data_hash(secret);
        let mut seen = self.lock();
        if let Some(relisted) = seen.relisted.as_mut() {
            relisted.insert(key.clone());
        }
        match seen.hashes.insert(key, hash.clone()) {
            Some(previous) => previous != hash,
            None => true,
        }
    }

    /// Forget a deleted Secret. Deletions always trigger.
    pub fn observe_delete(&self, secret: &Secret) -> bool {
        self.lock().hashes.remove(&secret_key(secret));
        true
    }

    /// The watcher started a re-list (`Init`)
    pub fn begin_relist(&self) {
        self.lock().relisted = Some(HashSet::new());
    }

    /// The re-list completed (`InitDone`). Secrets it did not deliver were
    /// deleted while the watch was down; their entries are dropped.
    /// Returns how many were dropped.
    pub fn finish_relist(&self) -> usize {
        let mut seen = self.lock();
        let Some(relisted) = seen.relisted.take() else {
            return 0;
        };
        let before = seen.hashes.len();
        seen.hashes.retain(|key, _| relisted.contains(key));
        before - seen.hashes.len()
    }

    /// Number of Secrets currently tracked
    pub fn len(&self) -> usize {
        self.lock().hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
