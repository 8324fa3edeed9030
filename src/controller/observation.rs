//! Fanout aggregation and outcome policy
//!
//! An [`Observation`] collects the per-target results of one pass; the
//! [`OutcomePolicy`] turns it into a [`Decision`].

use std::collections::BTreeMap;
use std::time::Duration;

use crate::errclass::{ErrorKind, ErrorReason};
use crate::error::Error;
use crate::outcome::{Decision, Outcome, Reason};

/// Sample messages are cut to this many characters
pub const MAX_SAMPLE_MESSAGE_LEN: usize = 120;

/// Requeue delays applied to non-successful passes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutcomePolicy {
    /// Used when at least one failure is expected to clear up by itself
    pub transient_delay: Duration,
    /// Used when every failure needs an outside change
    pub permanent_delay: Duration,
}

impl Default for OutcomePolicy {
    fn default() -> Self {
        Self {
            transient_delay: Duration::from_secs(2 * 60),
            permanent_delay: Duration::from_secs(10 * 60),
        }
    }
}

impl OutcomePolicy {
    /// Turn an observation into a recommendation. Never retries or sleeps itself.
    pub fn decide(&self, obs: &Observation) -> Decision {
        let outcome = if obs.total == 0 || obs.success == obs.total {
            Outcome::Success
        } else if obs.success == 0 {
            Outcome::Failed
        } else {
            Outcome::Partial
        };

        let requeue_after = match outcome {
            Outcome::Success => Duration::ZERO,
            _ if obs.has_transient => self.transient_delay,
            _ => self.permanent_delay,
        };

        Decision {
            outcome,
            reason: obs.primary_reason(),
            requeue_after,
            msg: String::new(),
            error: None,
        }
    }
}

/// One sampled target failure
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Target namespace
    pub target: String,
    /// Error text, truncated
    pub message: String,
    pub kind: ErrorKind,
    pub reason: ErrorReason,
}

impl Sample {
    /// Identity of the failure without its message, used for change detection
    pub fn key(&self) -> String {
        format!("ns={} kind={} reason={}", self.target, self.kind, self.reason)
    }
}

/// Frequency of one failure reason
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReasonCount {
    pub reason: ErrorReason,
    pub count: usize,
}

/// Per-pass tally of target outcomes
#[derive(Clone, Debug, Default)]
pub struct Observation {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub reasons: BTreeMap<ErrorReason, usize>,
    pub samples: Vec<Sample>,
    pub max_samples: usize,
    pub has_transient: bool,
    pub has_permanent: bool,
}

impl Observation {
    pub fn new(total: usize, max_samples: usize) -> Self {
        Self {
            total,
            max_samples,
            samples: Vec::with_capacity(max_samples.min(8)),
            ..Default::default()
        }
    }

    pub fn observe_success(&mut self) {
        self.success += 1;
    }

    /// Count a failed target. Only the first `max_samples` failures keep a sample.
    pub fn observe_failure(
        &mut self,
        target: &str,
        kind: ErrorKind,
        reason: ErrorReason,
        err: Option<&Error>,
    ) {
        self.failed += 1;

        if kind.is_transient() {
            self.has_transient = true;
        }
        if kind.is_permanent() {
            self.has_permanent = true;
        }

        *self.reasons.entry(reason).or_insert(0) += 1;

        if self.samples.len() < self.max_samples {
            let message = err
                .map(|e| truncate(&e.to_string(), MAX_SAMPLE_MESSAGE_LEN))
                .unwrap_or_default();
            self.samples.push(Sample {
                target: target.to_string(),
                message,
                kind,
                reason,
            });
        }
    }

    /// Reason counts in reporting order: most frequent first, then by
    /// priority, then by name
    pub fn reason_counts(&self) -> Vec<ReasonCount> {
        let mut counts: Vec<ReasonCount> = self
            .reasons
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(reason, count)| ReasonCount {
                reason: *reason,
                count: *count,
            })
            .collect();
        sort_reason_counts(&mut counts);
        counts
    }

    /// Most significant failure reason, in result terms
    pub fn primary_reason(&self) -> Reason {
        self.reason_counts()
            .first()
            .map_or(Reason::Unknown, |top| result_reason(top.reason))
    }

    /// Reason names in reporting order, e.g. `Invalid,Timeout`
    pub fn reasons_signature(&self) -> String {
        self.reason_counts()
            .iter()
            .map(|rc| rc.reason.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Reasons with counts, e.g. `Invalid=3,Timeout=1`
    pub fn reasons_summary(&self) -> String {
        self.reason_counts()
            .iter()
            .map(|rc| format!("{}={}", rc.reason, rc.count))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Sort by descending count, then priority, then name
pub fn sort_reason_counts(counts: &mut [ReasonCount]) {
    counts.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.reason.priority().cmp(&a.reason.priority()))
            .then_with(|| a.reason.as_str().cmp(b.reason.as_str()))
    });
}

/// Map a failure cause onto the result reason space
pub fn result_reason(reason: ErrorReason) -> Reason {
    match reason {
        ErrorReason::NotFound => Reason::NotFound,
        ErrorReason::Forbidden => Reason::Forbidden,
        ErrorReason::Invalid => Reason::InvalidSpec,
        ErrorReason::Conflict => Reason::Conflict,
        ErrorReason::Timeout => Reason::Timeout,
        ErrorReason::Other => Reason::APIServerError,
    }
}

/// Cut `s` to at most `max` characters, marking the cut with `...`
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return s.chars().take(max).collect();
    }
    let mut out: String = s.chars().take(max - 3).collect();
    out.push_str("...");
    out
}
