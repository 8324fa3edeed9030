//! Error classification
//!
//! Maps any operator [`Error`] onto a two-axis [`Classification`]: a retry
//! class ([`ErrorKind`]) and a cause ([`ErrorReason`]). Classification is pure
//! and deterministic. Anything not recognised falls back to
//! `(Transient, Other)` so an unknown failure is retried rather than dropped.

use std::fmt;

use kube::core::ErrorResponse;

use crate::error::Error;

/// How a missing object should be treated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NotFoundPolicy {
    /// Missing objects are a configuration problem
    #[default]
    AsConfig,
    /// Missing objects are a dependency that may still show up
    AsTransient,
}

/// Retry class of a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transient,
    Terminal,
    Conflict,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "Transient",
            ErrorKind::Terminal => "Terminal",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Config => "Config",
        }
    }

    /// Kinds that usually clear up on their own
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Conflict)
    }

    /// Kinds that need something outside the operator to change
    pub fn is_permanent(&self) -> bool {
        matches!(self, ErrorKind::Terminal | ErrorKind::Config)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cause of a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorReason {
    Forbidden,
    Conflict,
    NotFound,
    Timeout,
    Invalid,
    Other,
}

impl ErrorReason {
    pub const ALL: [ErrorReason; 6] = [
        ErrorReason::Forbidden,
        ErrorReason::Conflict,
        ErrorReason::NotFound,
        ErrorReason::Timeout,
        ErrorReason::Invalid,
        ErrorReason::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::Forbidden => "Forbidden",
            ErrorReason::Conflict => "Conflict",
            ErrorReason::NotFound => "NotFound",
            ErrorReason::Timeout => "Timeout",
            ErrorReason::Invalid => "Invalid",
            ErrorReason::Other => "Other",
        }
    }

    /// Tie-break weight when two reasons occur equally often.
    ///
    /// Reasons a person has to act on outrank the ones that resolve themselves.
    pub fn priority(&self) -> u8 {
        match self {
            ErrorReason::Invalid => 60,
            ErrorReason::Forbidden => 50,
            ErrorReason::NotFound => 40,
            ErrorReason::Conflict => 30,
            ErrorReason::Timeout => 20,
            ErrorReason::Other => 10,
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Classification {
    pub kind: ErrorKind,
    pub reason: ErrorReason,
}

impl Classification {
    pub const fn new(kind: ErrorKind, reason: ErrorReason) -> Self {
        Self { kind, reason }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.reason)
    }
}

/// Kubernetes `Status.reason` values the classifier distinguishes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ApiReason {
    Conflict,
    AlreadyExists,
    Forbidden,
    Unauthorized,
    Invalid,
    NotFound,
    Timeout,
    ServerTimeout,
    TooManyRequests,
    InternalError,
    Unknown,
}

impl ApiReason {
    /// Resolve the reason of an API error, falling back to the HTTP code when
    /// the server sent no reason (or one we do not know).
    fn of(resp: &ErrorResponse) -> Self {
        match resp.reason.as_str() {
            "Conflict" => ApiReason::Conflict,
            "AlreadyExists" => ApiReason::AlreadyExists,
            "Forbidden" => ApiReason::Forbidden,
            "Unauthorized" => ApiReason::Unauthorized,
            "Invalid" => ApiReason::Invalid,
            "NotFound" => ApiReason::NotFound,
            "Timeout" => ApiReason::Timeout,
            "ServerTimeout" => ApiReason::ServerTimeout,
            "TooManyRequests" => ApiReason::TooManyRequests,
            "InternalError" => ApiReason::InternalError,
            _ => match resp.code {
                409 => ApiReason::Conflict,
                403 => ApiReason::Forbidden,
                401 => ApiReason::Unauthorized,
                422 => ApiReason::Invalid,
                404 => ApiReason::NotFound,
                504 => ApiReason::Timeout,
                429 => ApiReason::TooManyRequests,
                500 => ApiReason::InternalError,
                _ => ApiReason::Unknown,
            },
        }
    }
}

/// Classify an optional error. No error means no classification.
pub fn classify_optional(err: Option<&Error>, not_found: NotFoundPolicy) -> Option<Classification> {
    err.map(|e| classify(e, not_found))
}

/// Classify a failure into its retry class and cause
pub fn classify(err: &Error, not_found: NotFoundPolicy) -> Classification {
    use ErrorKind::*;

    if is_deadline(err) {
        return Classification::new(Transient, ErrorReason::Timeout);
    }

    match err {
        Error::Cancelled(_) => Classification::new(Terminal, ErrorReason::Other),
        Error::ValidationError(_) => Classification::new(Config, ErrorReason::Invalid),
        Error::NotFound { .. } => not_found_class(not_found),
        Error::KubeError(e) | Error::StatusPatch { source: e, .. } => classify_kube(e, not_found),
        _ => Classification::new(Transient, ErrorReason::Other),
    }
}

/// Classify a raw client error, before it is wrapped into an operator [`Error`]
pub fn classify_kube(err: &kube::Error, not_found: NotFoundPolicy) -> Classification {
    if is_deadline(err) {
        return Classification::new(ErrorKind::Transient, ErrorReason::Timeout);
    }
    match err {
        kube::Error::Api(resp) => classify_api(resp, not_found),
        _ => Classification::new(ErrorKind::Transient, ErrorReason::Other),
    }
}

fn classify_api(resp: &ErrorResponse, not_found: NotFoundPolicy) -> Classification {
    use ErrorKind::*;

    match ApiReason::of(resp) {
        ApiReason::Conflict | ApiReason::AlreadyExists => {
            Classification::new(Conflict, ErrorReason::Conflict)
        }
        ApiReason::Forbidden | ApiReason::Unauthorized => {
            Classification::new(Config, ErrorReason::Forbidden)
        }
        ApiReason::Invalid => Classification::new(Config, ErrorReason::Invalid),
        ApiReason::NotFound => not_found_class(not_found),
        ApiReason::Timeout | ApiReason::ServerTimeout | ApiReason::TooManyRequests => {
            Classification::new(Transient, ErrorReason::Timeout)
        }
        ApiReason::InternalError => Classification::new(Transient, ErrorReason::Other),
        // Code 0 and every other 5xx still lands on retry; so does the rest.
        ApiReason::Unknown => Classification::new(Transient, ErrorReason::Other),
    }
}

fn not_found_class(not_found: NotFoundPolicy) -> Classification {
    match not_found {
        NotFoundPolicy::AsTransient => {
            Classification::new(ErrorKind::Transient, ErrorReason::NotFound)
        }
        NotFoundPolicy::AsConfig => Classification::new(ErrorKind::Config, ErrorReason::NotFound),
    }
}

/// True for our own deadline errors and for any timed-out I/O in the source chain
fn is_deadline(err: &(dyn std::error::Error + 'static)) -> bool {
    if err.is::<tokio::time::error::Elapsed>()
        || err.downcast_ref::<Error>().is_some_and(|e| matches!(e, Error::Timeout(_)))
    {
        return true;
    }
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn api_error(reason: &str, code: u16) -> Error {
        Error::KubeError(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: reason.to_string(),
            code,
        }))
    }

    fn classified(err: &Error) -> (ErrorKind, ErrorReason) {
        let c = classify(err, NotFoundPolicy::AsTransient);
        (c.kind, c.reason)
    }

    #[test]
    fn test_absent_error_has_no_classification() {
        assert_eq!(classify_optional(None, NotFoundPolicy::AsConfig), None);
        let err = Error::Cancelled("stop".to_string());
        assert_eq!(
            classify_optional(Some(&err), NotFoundPolicy::AsConfig),
            Some(Classification::new(ErrorKind::Terminal, ErrorReason::Other))
        );
    }

    #[tokio::test]
    async fn test_deadline_is_transient_timeout() {
        let elapsed = tokio::time::timeout(Duration::from_millis(1), std::future::pending::<()>())
            .await
            .unwrap_err();
        let err = Error::from(elapsed);
        assert_eq!(classified(&err), (ErrorKind::Transient, ErrorReason::Timeout));
    }

    #[test]
    fn test_cancellation_is_terminal() {
        let err = Error::Cancelled("controller shutting down".to_string());
        assert_eq!(classified(&err), (ErrorKind::Terminal, ErrorReason::Other));
    }

    #[test]
    fn test_conflicts() {
        assert_eq!(
            classified(&api_error("Conflict", 409)),
            (ErrorKind::Conflict, ErrorReason::Conflict)
        );
        assert_eq!(
            classified(&api_error("AlreadyExists", 409)),
            (ErrorKind::Conflict, ErrorReason::Conflict)
        );
    }

    #[test]
    fn test_auth_and_validation_are_config() {
        assert_eq!(
            classified(&api_error("Forbidden", 403)),
            (ErrorKind::Config, ErrorReason::Forbidden)
        );
        assert_eq!(
            classified(&api_error("Unauthorized", 401)),
            (ErrorKind::Config, ErrorReason::Forbidden)
        );
        assert_eq!(
            classified(&api_error("Invalid", 422)),
            (ErrorKind::Config, ErrorReason::Invalid)
        );
        assert_eq!(
            classified(&Error::ValidationError("no targets".to_string())),
            (ErrorKind::Config, ErrorReason::Invalid)
        );
    }

    #[test]
    fn test_not_found_follows_policy() {
        let err = api_error("NotFound", 404);
        assert_eq!(
            classify(&err, NotFoundPolicy::AsTransient),
            Classification::new(ErrorKind::Transient, ErrorReason::NotFound)
        );
        assert_eq!(
            classify(&err, NotFoundPolicy::AsConfig),
            Classification::new(ErrorKind::Config, ErrorReason::NotFound)
        );

        let local = Error::NotFound {
            kind: "Secret".to_string(),
            name: "src".to_string(),
            namespace: "default".to_string(),
        };
        assert_eq!(
            classify(&local, NotFoundPolicy::AsConfig),
            Classification::new(ErrorKind::Config, ErrorReason::NotFound)
        );
    }

    #[test]
    fn test_server_throttling_is_transient_timeout() {
        for (reason, code) in [("Timeout", 504), ("ServerTimeout", 500), ("TooManyRequests", 429)] {
            assert_eq!(
                classified(&api_error(reason, code)),
                (ErrorKind::Transient, ErrorReason::Timeout),
                "reason {}",
                reason
            );
        }
    }

    #[test]
    fn test_reasonless_errors_fall_back_to_code() {
        assert_eq!(
            classified(&api_error("", 404)),
            (ErrorKind::Transient, ErrorReason::NotFound)
        );
        assert_eq!(
            classified(&api_error("", 409)),
            (ErrorKind::Conflict, ErrorReason::Conflict)
        );
        assert_eq!(
            classified(&api_error("", 429)),
            (ErrorKind::Transient, ErrorReason::Timeout)
        );
    }

    #[test]
    fn test_server_errors_and_unknowns_retry() {
        assert_eq!(
            classified(&api_error("InternalError", 500)),
            (ErrorKind::Transient, ErrorReason::Other)
        );
        assert_eq!(
            classified(&api_error("ServiceUnavailable", 503)),
            (ErrorKind::Transient, ErrorReason::Other)
        );
        assert_eq!(
            classified(&api_error("", 0)),
            (ErrorKind::Transient, ErrorReason::Other)
        );
        assert_eq!(
            classified(&api_error("BadRequest", 400)),
            (ErrorKind::Transient, ErrorReason::Other)
        );
        assert_eq!(
            classified(&Error::ConfigError("odd".to_string())),
            (ErrorKind::Transient, ErrorReason::Other)
        );
    }

    #[test]
    fn test_status_patch_classifies_its_source() {
        let err = Error::StatusPatch {
            kind: ErrorKind::Conflict,
            reason: ErrorReason::Conflict,
            source: kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: "the object has been modified".to_string(),
                reason: "Conflict".to_string(),
                code: 409,
            }),
        };
        assert_eq!(classified(&err), (ErrorKind::Conflict, ErrorReason::Conflict));
    }

    #[test]
    fn test_raw_client_errors() {
        let forbidden = kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "denied".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        });
        assert_eq!(
            classify_kube(&forbidden, NotFoundPolicy::AsTransient),
            Classification::new(ErrorKind::Config, ErrorReason::Forbidden)
        );

        let timed_out = kube::Error::Service(Box::new(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "read timed out",
        )));
        assert_eq!(
            classify_kube(&timed_out, NotFoundPolicy::AsTransient),
            Classification::new(ErrorKind::Transient, ErrorReason::Timeout)
        );
    }

    #[test]
    fn test_priorities_are_strictly_ordered() {
        let mut reasons = ErrorReason::ALL.to_vec();
        reasons.sort_by_key(|r| std::cmp::Reverse(r.priority()));
        assert_eq!(
            reasons,
            vec![
                ErrorReason::Invalid,
                ErrorReason::Forbidden,
                ErrorReason::NotFound,
                ErrorReason::Conflict,
                ErrorReason::Timeout,
                ErrorReason::Other,
            ]
        );
    }
}
