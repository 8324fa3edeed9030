//! Throttled failure logging
//!
//! Full success is silent. A failure that changed the status is always
//! logged; otherwise it is logged when its reminder interval has elapsed or
//! when the set of failing targets looks different from last time.

use chrono::{DateTime, TimeDelta, Utc};
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use tracing::{error, warn};

use crate::controller::metrics::Phase;
use crate::controller::observation::{
    result_reason, truncate, Observation, Sample, MAX_SAMPLE_MESSAGE_LEN,
};
use crate::crd::IdentitySyncPolicy;
use crate::errclass::{self, NotFoundPolicy};
use crate::error::Error;
use crate::outcome::{Decision, Outcome, Reason};
use crate::throttle::LogRateLimiter;

/// Sample keys folded into the change fingerprint
const FINGERPRINT_SAMPLES: usize = 3;

/// Minimum spacing between logs of a flapping failure set
const CHANGE_INTERVAL: TimeDelta = TimeDelta::seconds(30);

/// Why a failure line was emitted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogTag {
    /// The pass patched the status
    Transition,
    /// Same failure, reminder interval elapsed or content changed
    Reminder,
}

impl LogTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::Transition => "transition",
            LogTag::Reminder => "reminder",
        }
    }
}

/// How long the same primary failure stays quiet
pub fn reminder_interval(reason: Reason) -> TimeDelta {
    match reason {
        Reason::NotFound => TimeDelta::minutes(20),
        Reason::Forbidden | Reason::InvalidSpec => TimeDelta::minutes(5),
        Reason::Timeout | Reason::APIServerError | Reason::Conflict => TimeDelta::minutes(2),
        _ => TimeDelta::minutes(10),
    }
}

/// Sorted, de-duplicated sample keys, at most `max` of them
pub fn build_sample_keys(samples: &[Sample], max: usize) -> Vec<String> {
    if max == 0 {
        return Vec::new();
    }
    let mut keys: Vec<String> = samples.iter().map(Sample::key).collect();
    keys.sort();
    keys.dedup();
    keys.truncate(max);
    keys
}

/// Order-independent digest of a list of strings
pub fn hash_strings(items: &[String]) -> String {
    let mut sorted: Vec<&str> = items.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for item in sorted {
        hasher.update(item.as_bytes());
        // separator so ["ab", "c"] and ["a", "bc"] differ
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Human-readable sample lines for the log record
pub fn format_samples(samples: &[Sample]) -> Vec<String> {
    samples
        .iter()
        .map(|s| {
            format!(
                "{} msg={:?}",
                s.key(),
                truncate(&s.message, MAX_SAMPLE_MESSAGE_LEN)
            )
        })
        .collect()
}

/// Decide whether this failure gets a log line, and with which tag
pub fn log_tag(
    limiter: &LogRateLimiter,
    uid: &str,
    phase: Phase,
    decision: &Decision,
    observation: Option<&Observation>,
    status_patched: bool,
    now: DateTime<Utc>,
) -> Option<LogTag> {
    if decision.outcome == Outcome::Success {
        return None;
    }
    if status_patched {
        return Some(LogTag::Transition);
    }

    let (signature, samples_hash) = observation
        .map(|obs| {
            let keys = build_sample_keys(&obs.samples, FINGERPRINT_SAMPLES);
            (obs.reasons_signature(), hash_strings(&keys))
        })
        .unwrap_or_default();

    let primary = decision.reason;
    let reminder = format!("fail|{}|{}|{}", uid, phase, primary);
    let change = format!(
        "chg|{}|{}|{}|{}|{}",
        uid, phase, decision.outcome, signature, samples_hash
    );

    // Evaluate both so each gate's window advances independently
    let reminder_due = limiter.allow(&reminder, now, reminder_interval(primary));
    let change_due = limiter.allow(&change, now, CHANGE_INTERVAL);

    (reminder_due || change_due).then_some(LogTag::Reminder)
}

/// Gate for the runtime-side line of a pass that ended in an error.
///
/// Keyed by policy and classification, spaced like the reminder of the
/// matching failure reason.
pub fn error_log_allowed(
    limiter: &LogRateLimiter,
    uid: &str,
    err: &Error,
    now: DateTime<Utc>,
) -> bool {
    let class = err.classify();
    let fingerprint = format!("err|{}|{}", uid, class);
    limiter.allow(&fingerprint, now, reminder_interval(result_reason(class.reason)))
}

/// Emit the failure line for this pass when the gate allows it
pub fn log_operation_if_allowed(
    limiter: &LogRateLimiter,
    phase: Phase,
    policy: &IdentitySyncPolicy,
    decision: &Decision,
    observation: Option<&Observation>,
    status_patched: bool,
) {
    let uid = policy.metadata.uid.as_deref().unwrap_or_default();
    let Some(tag) = log_tag(
        limiter,
        uid,
        phase,
        decision,
        observation,
        status_patched,
        Utc::now(),
    ) else {
        return;
    };

    let name = policy.name_any();
    let error = decision
        .error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_default();
    let class = errclass::classify_optional(decision.error.as_ref(), NotFoundPolicy::AsTransient)
        .map(|c| c.to_string())
        .unwrap_or_default();
    let (success, failed, total, reasons, samples) = observation
        .map(|obs| {
            (
                obs.success,
                obs.failed,
                obs.total,
                obs.reasons_summary(),
                format_samples(&obs.samples),
            )
        })
        .unwrap_or_default();
    let has_transient = observation.is_some_and(|obs| obs.has_transient);
    let has_permanent = observation.is_some_and(|obs| obs.has_permanent);

    match decision.outcome {
        Outcome::Failed => error!(
            policy = %name,
            phase = %phase,
            outcome = %decision.outcome,
            reason = %decision.reason,
            msg = %decision.msg,
            tag = tag.as_str(),
            error = %error,
            class = %class,
            success,
            failed,
            total,
            has_transient,
            has_permanent,
            reasons = %reasons,
            samples = ?samples,
            "Reconcile failed"
        ),
        Outcome::Partial => warn!(
            policy = %name,
            phase = %phase,
            outcome = %decision.outcome,
            reason = %decision.reason,
            msg = %decision.msg,
            tag = tag.as_str(),
            success,
            failed,
            total,
            has_transient,
            has_permanent,
            reasons = %reasons,
            samples = ?samples,
            "Reconcile degraded"
        ),
        Outcome::Success => {}
    }
}
