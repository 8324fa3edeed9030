use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::{self, Config},
        WatchStreamExt,
    },
    ResourceExt,
};
use tracing::{debug, error, info, instrument};

use crate::config::ReconcileSettings;
use crate::crd::{IdentitySyncPolicy, IdentitySyncPolicyStatus};
use crate::errclass::{self, NotFoundPolicy};
use crate::error::{Error, Result};
use crate::outcome::{Decision, Outcome, Reason};
use crate::status::ConditionSet;
use crate::throttle::LogRateLimiter;

use super::conditions;
use super::fanout;
use super::fastpath::should_fast_path;
use super::logging::{error_log_allowed, log_operation_if_allowed};
use super::metrics::{Attempt, Fanout, Phase, Recorder};
use super::observation::{result_reason, Observation};
use super::watch::{policies_for_secret, secret_data_hash, SecretChangeFilter};

/// Requeue delay when the source Secret does not exist yet
const SOURCE_MISSING_REQUEUE: Duration = Duration::from_secs(5 * 60);

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    /// Process-wide log throttle
    pub limiter: Arc<LogRateLimiter>,
    pub recorder: Arc<dyn Recorder>,
    pub settings: ReconcileSettings,
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let policies: Api<IdentitySyncPolicy> = Api::all(client.clone());

    info!("Starting IdentitySyncPolicy controller");

    // Verify CRD exists
    match policies.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("IdentitySyncPolicy CRD is available"),
        Err(e) => {
            error!(
                "IdentitySyncPolicy CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "IdentitySyncPolicy CRD not installed".to_string(),
            ));
        }
    }

    let controller = Controller::new(policies, Config::default());
    let store = controller.store();

    // Source Secrets trigger the policies that reference them, but only when
    // their data changes or they come and go
    let changes = Arc::new(SecretChangeFilter::new());
    let secrets: Api<Secret> = Api::all(client);
    let secret_events = watcher::watcher(secrets, Config::default())
        .default_backoff()
        .filter_map(move |event| {
            let changes = changes.clone();
            async move {
                match event {
                    Ok(watcher::Event::Apply(s)) | Ok(watcher::Event::InitApply(s)) => {
                        changes.observe_apply(&s).then(|| Ok(s))
                    }
                    Ok(watcher::Event::Delete(s)) => changes.observe_delete(&s).then(|| Ok(s)),
                    Ok(watcher::Event::Init) => {
                        changes.begin_relist();
                        None
                    }
                    Ok(watcher::Event::InitDone) => {
                        let dropped = changes.finish_relist();
                        debug!(dropped, "secret re-list complete");
                        None
                    }
                    Err(e) => Some(Err(e)),
                }
            }
        });

    controller
        .watches_stream(secret_events, move |secret| {
            policies_for_secret(&store.state(), &secret)
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                // error_policy already reported it, throttled
                Err(e) => debug!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// Everything `finish` needs to know about a pass
struct Pass<'a> {
    policy: &'a IdentitySyncPolicy,
    phase: Phase,
    conditions: ConditionSet,
    /// Fresh source hash, known once the Secret was read
    current_hash: Option<String>,
    observation: Option<Observation>,
    start: Instant,
}

/// The main reconciliation function
///
/// This function is called whenever:
/// - An IdentitySyncPolicy is created or updated
/// - A referenced source Secret is created, deleted, or its data changes
/// - The requeue timer expires
#[instrument(skip(policy, ctx), fields(name = %policy.name_any()))]
async fn reconcile(policy: Arc<IdentitySyncPolicy>, ctx: Arc<ControllerState>) -> Result<Action> {
    let start = Instant::now();
    let generation = policy.metadata.generation.unwrap_or(0);
    let existing = policy
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();

    let mut pass = Pass {
        policy: &policy,
        phase: Phase::Precondition,
        conditions: ConditionSet::new(existing, generation, Utc::now()),
        current_hash: None,
        observation: None,
        start,
    };

    if let Err(e) = policy.spec.validate() {
        let decision = Decision::failed(Reason::InvalidSpec, e)
            .requeue_after(ctx.settings.policy.permanent_delay);
        return finish(&ctx, pass, decision).await;
    }

    let source_ref = &policy.spec.secret.source_ref;
    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &source_ref.namespace);
    let source = match secrets.get_opt(&source_ref.name).await {
        Ok(Some(secret)) => secret,
        Ok(None) => {
            let decision = Decision::failed(Reason::NotFound, "reference secret not found")
                .requeue_after(SOURCE_MISSING_REQUEUE);
            return finish(&ctx, pass, decision).await;
        }
        Err(e) => {
            let class = errclass::classify_kube(&e, NotFoundPolicy::AsTransient);
            let decision =
                Decision::failed(result_reason(class.reason), "failed reading reference secret")
                    .with_error(Error::KubeError(e));
            return finish(&ctx, pass, decision).await;
        }
    };

    let current_hash = secret_data_hash(&source);
    if should_fast_path(&policy, &current_hash) {
        debug!("Status is current and source unchanged, skipping fanout");
        return Ok(Action::await_change());
    }

    let observation = fanout::sync_targets(&ctx.client, &policy, &source, &ctx.settings).await;
    let mut decision = ctx.settings.policy.decide(&observation);
    decision.msg = match decision.outcome {
        Outcome::Success => "fanout completed",
        Outcome::Partial => "partial fanout failure",
        Outcome::Failed => "fanout failed",
    }
    .to_string();

    pass.phase = Phase::Fanout;
    pass.current_hash = Some(current_hash);
    pass.observation = Some(observation);
    finish(&ctx, pass, decision).await
}

/// Write conditions, record metrics, log, and hand the decision to the runtime
async fn finish(ctx: &ControllerState, mut pass: Pass<'_>, decision: Decision) -> Result<Action> {
    apply_conditions(&mut pass.conditions, pass.phase, &decision);

    let desired = desired_status(
        pass.policy,
        &pass.conditions,
        decision.outcome,
        pass.current_hash.as_deref(),
    );
    let status_patched = match desired {
        Some(status) => {
            patch_status(
                &ctx.client,
                &ctx.settings.field_manager,
                pass.policy,
                &status,
            )
            .await?;
            true
        }
        None => false,
    };

    ctx.recorder.record_attempt(
        &Attempt {
            outcome: decision.outcome,
            reason: decision.reason,
            phase: pass.phase,
        },
        pass.start.elapsed(),
    );
    if let Some(obs) = &pass.observation {
        ctx.recorder.record_fanout(&Fanout {
            total: obs.total,
            success: obs.success,
            failed: obs.failed,
        });
    }

    log_operation_if_allowed(
        &ctx.limiter,
        pass.phase,
        pass.policy,
        &decision,
        pass.observation.as_ref(),
        status_patched,
    );

    decision.into_action()
}

/// Map the phase and outcome of a pass onto its conditions.
///
/// The precondition phase owns `ReferenceSecretReady`; `Ready` and `Degraded`
/// follow the outcome.
fn apply_conditions(cs: &mut ConditionSet, phase: Phase, decision: &Decision) {
    match phase {
        Phase::Precondition => match decision.reason {
            Reason::NotFound => conditions::mark_secret_not_found(cs, "Reference secret not found"),
            Reason::InvalidSpec => {
                conditions::mark_secret_get_failed(cs, decision.reason, &decision.msg)
            }
            reason => conditions::mark_secret_get_failed(cs, reason, "Reference secret get failed"),
        },
        Phase::Fanout => conditions::mark_secret_available(cs, "Reference secret available"),
    }

    if decision.outcome == Outcome::Success {
        conditions::mark_ready(cs, "Reconcile completed");
        return;
    }
    let message = match &decision.error {
        Some(err) => err.status_message(),
        None if decision.msg.is_empty() => "Reconcile failed".to_string(),
        None => decision.msg.clone(),
    };
    conditions::mark_degraded(cs, &message);
}

/// Status to persist, or `None` when neither the conditions nor the
/// observed hash moved. Only a successful pass records `current_hash`;
/// any other outcome carries the stored hash over.
fn desired_status(
    policy: &IdentitySyncPolicy,
    cs: &ConditionSet,
    outcome: Outcome,
    current_hash: Option<&str>,
) -> Option<IdentitySyncPolicyStatus> {
    let stored_hash = policy
        .status
        .as_ref()
        .map(|s| s.observed_source_secret_hash.as_str())
        .unwrap_or_default();
    let fresh_hash = current_hash
        .filter(|_| outcome == Outcome::Success)
        .filter(|h| !h.is_empty() && *h != stored_hash);

    if !cs.changed() && fresh_hash.is_none() {
        return None;
    }

    Some(IdentitySyncPolicyStatus {
        conditions: cs.conditions(),
        observed_source_secret_hash: fresh_hash.unwrap_or(stored_hash).to_string(),
    })
}

/// Merge-patch the status.
///
/// The patch carries the resourceVersion we read, so a concurrent writer
/// makes it fail with a conflict instead of being overwritten.
async fn patch_status(
    client: &Client,
    field_manager: &str,
    policy: &IdentitySyncPolicy,
    status: &IdentitySyncPolicyStatus,
) -> Result<()> {
    let mut patch = serde_json::json!({ "status": serde_json::to_value(status)? });
    if let Some(rv) = policy.resource_version() {
        patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
    }

    let api: Api<IdentitySyncPolicy> = Api::all(client.clone());
    let params = PatchParams {
        field_manager: Some(field_manager.to_string()),
        ..Default::default()
    };
    api.patch_status(&policy.name_any(), &params, &Patch::Merge(&patch))
        .await
        .map_err(|source| {
            let class = errclass::classify_kube(&source, NotFoundPolicy::AsTransient);
            Error::StatusPatch {
                kind: class.kind,
                reason: class.reason,
                source,
            }
        })?;

    debug!(conditions = status.conditions.len(), "status patched");
    Ok(())
}

/// Error policy for the controller
fn error_policy(policy: Arc<IdentitySyncPolicy>, error: &Error, ctx: Arc<ControllerState>) -> Action {
    let uid = policy.metadata.uid.as_deref().unwrap_or_default();
    if error_log_allowed(&ctx.limiter, uid, error, Utc::now()) {
        error!("Reconciliation error for {}: {:?}", policy.name_any(), error);
    } else {
        debug!("Reconciliation error for {}: {:?}", policy.name_any(), error);
    }

    Action::requeue(retry_delay(error))
}

/// Use shorter retry for retriable errors
fn retry_delay(error: &Error) -> Duration {
    if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    }
}
