//! Controller module for IdentitySyncPolicy reconciliation
//!
//! This module contains the controller loop, the per-pass decision logic,
//! and the management of the objects synced into target namespaces.

mod conditions;
mod fanout;
mod fastpath;
pub mod logging;
pub mod metrics;
mod observation;
mod reconciler;
mod resources;
mod watch;

pub use fastpath::should_fast_path;
pub use metrics::{Attempt, Fanout, NoopRecorder, Phase, PrometheusRecorder, Recorder};
pub use observation::{Observation, OutcomePolicy, ReasonCount, Sample};
pub use reconciler::{run_controller, ControllerState};
pub use watch::{secret_data_hash, SecretChangeFilter};
