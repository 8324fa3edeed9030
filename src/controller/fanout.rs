//! Per-namespace sync of a policy's ServiceAccount and Secret

use k8s_openapi::api::core::v1::Secret;
use kube::Client;
use tracing::{debug, instrument};

use crate::config::ReconcileSettings;
use crate::crd::IdentitySyncPolicy;
use crate::errclass::{self, NotFoundPolicy};
use crate::error::{Error, Result};

use super::observation::Observation;
use super::resources;

/// Sync every target namespace in order and tally the results.
///
/// A failing target never stops the loop; its error is classified and
/// recorded on the returned observation.
#[instrument(skip_all, fields(targets = policy.spec.target_namespaces.len()))]
pub async fn sync_targets(
    client: &Client,
    policy: &IdentitySyncPolicy,
    source: &Secret,
    settings: &ReconcileSettings,
) -> Observation {
    let targets = &policy.spec.target_namespaces;
    let mut observation = Observation::new(targets.len(), settings.max_samples);

    for namespace in targets {
        let result = tokio::time::timeout(
            settings.target_timeout,
            sync_target(client, policy, namespace, source, &settings.field_manager),
        )
        .await
        .map_err(Error::from)
        .and_then(|inner| inner);

        match result {
            Ok(()) => observation.observe_success(),
            Err(e) => {
                let class = errclass::classify(&e, NotFoundPolicy::AsTransient);
                debug!(namespace = %namespace, class = %class, "target sync failed: {}", e);
                observation.observe_failure(namespace, class.kind, class.reason, Some(&e));
            }
        }
    }

    observation
}

/// ServiceAccount first, then the Secret
async fn sync_target(
    client: &Client,
    policy: &IdentitySyncPolicy,
    namespace: &str,
    source: &Secret,
    field_manager: &str,
) -> Result<()> {
    resources::ensure_service_account(client, policy, namespace, field_manager).await?;
    resources::ensure_secret(client, policy, namespace, source, field_manager).await?;
    Ok(())
}
