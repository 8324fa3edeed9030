//! Operator configuration
//!
//! Every setting can be given as a flag or through the environment.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::controller::OutcomePolicy;
use crate::throttle::DEFAULT_CAPACITY;

/// Field manager used for server-side apply and status patches
pub const DEFAULT_FIELD_MANAGER: &str = "identity-sync-operator";

#[derive(Parser, Clone, Debug)]
#[command(name = "identity-sync-operator")]
#[command(about = "Syncs a source Secret and ServiceAccount into target namespaces", long_about = None)]
#[command(version)]
pub struct OperatorConfig {
    /// Requeue delay after a pass with recoverable failures (seconds)
    #[arg(long, env = "ISO_TRANSIENT_DELAY_SECS", default_value_t = 120)]
    pub transient_delay_secs: u64,

    /// Requeue delay after a pass whose failures need an outside change (seconds)
    #[arg(long, env = "ISO_PERMANENT_DELAY_SECS", default_value_t = 600)]
    pub permanent_delay_secs: u64,

    /// Fingerprints kept by the log throttle
    #[arg(long, env = "ISO_LOG_LIMITER_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub log_limiter_capacity: usize,

    /// Failure samples kept per pass
    #[arg(long, env = "ISO_MAX_SAMPLES", default_value_t = 50)]
    pub max_samples: usize,

    /// Deadline for syncing a single target namespace (seconds)
    #[arg(long, env = "ISO_TARGET_TIMEOUT_SECS", default_value_t = 30)]
    pub target_timeout_secs: u64,

    /// Address serving /healthz and /metrics
    #[arg(long, env = "ISO_METRICS_ADDR", default_value = "0.0.0.0:8080")]
    pub metrics_addr: SocketAddr,

    /// Field manager name for applies and status patches
    #[arg(long, env = "ISO_FIELD_MANAGER", default_value = DEFAULT_FIELD_MANAGER)]
    pub field_manager: String,

    /// Emit logs as JSON
    #[arg(long, env = "ISO_LOG_JSON")]
    pub log_json: bool,

    /// Print the CustomResourceDefinition as YAML and exit
    #[arg(long)]
    pub print_crd: bool,
}

impl OperatorConfig {
    pub fn outcome_policy(&self) -> OutcomePolicy {
        OutcomePolicy {
            transient_delay: Duration::from_secs(self.transient_delay_secs),
            permanent_delay: Duration::from_secs(self.permanent_delay_secs),
        }
    }

    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            policy: self.outcome_policy(),
            max_samples: self.max_samples,
            target_timeout: Duration::from_secs(self.target_timeout_secs),
            field_manager: self.field_manager.clone(),
        }
    }
}

/// Per-pass knobs handed to the reconciler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub policy: OutcomePolicy,
    pub max_samples: usize,
    pub target_timeout: Duration,
    pub field_manager: String,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            policy: OutcomePolicy::default(),
            max_samples: 50,
            target_timeout: Duration::from_secs(30),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}
