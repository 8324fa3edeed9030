//! Condition writers used at the end of a pass
//!
//! `ReferenceSecretReady` tracks the precondition; `Ready` and `Degraded`
//! always move together and track the overall outcome.

use crate::crd::{
    ConditionStatus, CONDITION_DEGRADED, CONDITION_READY, CONDITION_REFERENCE_SECRET_READY,
    REASON_INVALID_SPEC, REASON_RBAC_FORBIDDEN, REASON_RECONCILED, REASON_RECONCILE_ERROR,
    REASON_SECRET_AVAILABLE, REASON_SECRET_GET_FAILED, REASON_SECRET_NOT_FOUND,
};
use crate::outcome::Reason;
use crate::status::ConditionSet;

pub fn mark_ready(cs: &mut ConditionSet, message: &str) {
    cs.set(CONDITION_READY, ConditionStatus::True, REASON_RECONCILED, message);
    cs.set(CONDITION_DEGRADED, ConditionStatus::False, REASON_RECONCILED, message);
}

pub fn mark_degraded(cs: &mut ConditionSet, message: &str) {
    cs.set(CONDITION_READY, ConditionStatus::False, REASON_RECONCILE_ERROR, message);
    cs.set(CONDITION_DEGRADED, ConditionStatus::True, REASON_RECONCILE_ERROR, message);
}

pub fn mark_secret_available(cs: &mut ConditionSet, message: &str) {
    cs.set(
        CONDITION_REFERENCE_SECRET_READY,
        ConditionStatus::True,
        REASON_SECRET_AVAILABLE,
        message,
    );
}

pub fn mark_secret_not_found(cs: &mut ConditionSet, message: &str) {
    cs.set(
        CONDITION_REFERENCE_SECRET_READY,
        ConditionStatus::False,
        REASON_SECRET_NOT_FOUND,
        message,
    );
}

/// Precondition failed for a reason other than a missing Secret
pub fn mark_secret_get_failed(cs: &mut ConditionSet, reason: Reason, message: &str) {
    let condition_reason = match reason {
        Reason::Forbidden => REASON_RBAC_FORBIDDEN,
        Reason::InvalidSpec => REASON_INVALID_SPEC,
        _ => REASON_SECRET_GET_FAILED,
    };
    cs.set(
        CONDITION_REFERENCE_SECRET_READY,
        ConditionStatus::False,
        condition_reason,
        message,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reason_of(cs: &ConditionSet, type_: &str) -> String {
        cs.conditions()
            .into_iter()
            .find(|c| c.type_ == type_)
            .map(|c| c.reason)
            .unwrap_or_default()
    }

    #[test]
    fn test_ready_and_degraded_are_complementary() {
        let mut cs = ConditionSet::new(&[], 1, Utc::now());

        mark_ready(&mut cs, "Reconcile completed");
        assert!(cs.is_condition_true(CONDITION_READY));
        assert!(!cs.is_condition_true(CONDITION_DEGRADED));

        mark_degraded(&mut cs, "fanout failed");
        assert!(!cs.is_condition_true(CONDITION_READY));
        assert!(cs.is_condition_true(CONDITION_DEGRADED));
        assert_eq!(reason_of(&cs, CONDITION_READY), REASON_RECONCILE_ERROR);
    }

    #[test]
    fn test_secret_get_failed_reasons() {
        let mut cs = ConditionSet::new(&[], 1, Utc::now());

        mark_secret_get_failed(&mut cs, Reason::Forbidden, "denied");
        assert_eq!(reason_of(&cs, CONDITION_REFERENCE_SECRET_READY), "RBACForbidden");

        mark_secret_get_failed(&mut cs, Reason::Timeout, "slow");
        assert_eq!(reason_of(&cs, CONDITION_REFERENCE_SECRET_READY), "SecretGetFailed");

        mark_secret_not_found(&mut cs, "gone");
        assert_eq!(reason_of(&cs, CONDITION_REFERENCE_SECRET_READY), "SecretNotFound");

        mark_secret_available(&mut cs, "here");
        assert!(cs.is_condition_true(CONDITION_REFERENCE_SECRET_READY));
        assert_ne!(REASON_SECRET_GET_FAILED, REASON_SECRET_AVAILABLE);
    }
}
