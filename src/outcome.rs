//! Outcome of a reconcile pass
//!
//! A [`Decision`] is what one pass recommends to the runtime: how it went,
//! why, and how long to wait before looking again.

use std::fmt;
use std::time::Duration;

use kube::runtime::controller::Action;

use crate::error::{Error, Result};

/// Aggregate result of a pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Partial,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result-domain reason reported in metrics and logs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Reason {
    APIServerError,
    PartialFailure,
    InvalidSpec,
    Forbidden,
    Conflict,
    NotFound,
    Timeout,
    #[default]
    Unknown,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::APIServerError => "APIServerError",
            Reason::PartialFailure => "PartialFailure",
            Reason::InvalidSpec => "InvalidSpec",
            Reason::Forbidden => "Forbidden",
            Reason::Conflict => "Conflict",
            Reason::NotFound => "NotFound",
            Reason::Timeout => "Timeout",
            Reason::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommendation produced at the end of a pass
#[derive(Debug)]
pub struct Decision {
    pub outcome: Outcome,
    pub reason: Reason,
    /// Zero means "wait for the next change"
    pub requeue_after: Duration,
    pub msg: String,
    pub error: Option<Error>,
}

impl Decision {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Success,
            reason: Reason::Unknown,
            requeue_after: Duration::ZERO,
            msg: msg.into(),
            error: None,
        }
    }

    pub fn failed(reason: Reason, msg: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed,
            reason,
            requeue_after: Duration::ZERO,
            msg: msg.into(),
            error: None,
        }
    }

    pub fn requeue_after(mut self, delay: Duration) -> Self {
        self.requeue_after = delay;
        self
    }

    pub fn with_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    /// Hand the decision back to the kube runtime.
    ///
    /// An attached error takes precedence and is routed to the error policy.
    pub fn into_action(self) -> Result<Action> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.requeue_after > Duration::ZERO {
            return Ok(Action::requeue(self.requeue_after));
        }
        Ok(Action::await_change())
    }
}
