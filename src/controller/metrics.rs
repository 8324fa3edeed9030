//! Prometheus metrics for the identity sync operator
//!
//! The reconciler reports through the [`Recorder`] trait so it can run with
//! metrics disabled ([`NoopRecorder`]) or exported ([`PrometheusRecorder`]).

use std::fmt;
use std::time::Duration;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::outcome::{Outcome, Reason};

/// Stage of the pass that produced the outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Reading and validating inputs before any target is touched
    Precondition,
    /// Syncing targets
    Fanout,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Precondition => "precondition",
            Phase::Fanout => "fanout",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finished reconcile attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attempt {
    pub outcome: Outcome,
    pub reason: Reason,
    pub phase: Phase,
}

/// Target counts of one fanout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fanout {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

/// Sink for per-pass metrics
pub trait Recorder: Send + Sync {
    fn record_attempt(&self, attempt: &Attempt, latency: Duration);
    fn record_fanout(&self, fanout: &Fanout);
}

/// Recorder that drops everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn record_attempt(&self, _attempt: &Attempt, _latency: Duration) {}

    fn record_fanout(&self, _fanout: &Fanout) {}
}

/// Labels for the per-attempt metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AttemptLabels {
    pub outcome: String,
    pub reason: String,
    pub phase: String,
}

impl From<&Attempt> for AttemptLabels {
    fn from(attempt: &Attempt) -> Self {
        Self {
            outcome: attempt.outcome.as_str().to_string(),
            reason: attempt.reason.as_str().to_string(),
            phase: attempt.phase.as_str().to_string(),
        }
    }
}

fn duration_histogram() -> Histogram {
    // 5ms .. ~10s
    Histogram::new(exponential_buckets(0.005, 2.0, 12))
}

/// Recorder backed by a `prometheus-client` registry
#[derive(Clone)]
pub struct PrometheusRecorder {
    reconcile_total: Family<AttemptLabels, Counter>,
    reconcile_duration: Family<AttemptLabels, Histogram, fn() -> Histogram>,
    fanout_targets: Counter,
    fanout_targets_synced: Counter,
}

impl PrometheusRecorder {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: &mut Registry) -> Self {
        let recorder = Self {
            reconcile_total: Family::default(),
            reconcile_duration: Family::new_with_constructor(duration_histogram),
            fanout_targets: Counter::default(),
            fanout_targets_synced: Counter::default(),
        };

        // counters get the `_total` suffix from the encoder
        registry.register(
            "identity_operator_reconcile",
            "Number of completed reconciles by outcome/reason/phase",
            recorder.reconcile_total.clone(),
        );
        registry.register(
            "identity_operator_reconcile_duration_seconds",
            "Duration of a reconcile in seconds by outcome/reason/phase",
            recorder.reconcile_duration.clone(),
        );
        registry.register(
            "identity_operator_fanout_targets",
            "Fanout targets processed, summed over fanout reconciles",
            recorder.fanout_targets.clone(),
        );
        registry.register(
            "identity_operator_fanout_targets_synced",
            "Fanout targets synced successfully, summed over fanout reconciles",
            recorder.fanout_targets_synced.clone(),
        );

        recorder
    }
}

impl fmt::Debug for PrometheusRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusRecorder").finish_non_exhaustive()
    }
}

impl Recorder for PrometheusRecorder {
    fn record_attempt(&self, attempt: &Attempt, latency: Duration) {
        let labels = AttemptLabels::from(attempt);
        self.reconcile_total.get_or_create(&labels).inc();
        self.reconcile_duration
            .get_or_create(&labels)
            .observe(latency.as_secs_f64());
    }

    fn record_fanout(&self, fanout: &Fanout) {
        self.fanout_targets.inc_by(fanout.total as u64);
        self.fanout_targets_synced.inc_by(fanout.success as u64);
    }
}
