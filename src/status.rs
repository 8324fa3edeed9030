//! Condition bookkeeping for one reconcile pass
//!
//! [`ConditionSet`] keeps the conditions as they were loaded next to a working
//! copy, so the end of a pass can tell whether a status write is needed
//! without re-reading the object.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::crd::{Condition, ConditionStatus};

/// Snapshot plus working copy of a policy's conditions
#[derive(Clone, Debug)]
pub struct ConditionSet {
    original: Vec<Condition>,
    conditions: BTreeMap<String, Condition>,
    reconcile_time: DateTime<Utc>,
    observed_generation: i64,
}

impl ConditionSet {
    /// Start a pass from the persisted conditions
    pub fn new(existing: &[Condition], generation: i64, reconcile_time: DateTime<Utc>) -> Self {
        let conditions = existing
            .iter()
            .filter(|c| !c.type_.is_empty())
            .map(|c| (c.type_.clone(), c.clone()))
            .collect();

        Self {
            original: existing.to_vec(),
            conditions,
            reconcile_time,
            observed_generation: generation,
        }
    }

    /// Live conditions, ordered by type
    pub fn conditions(&self) -> Vec<Condition> {
        self.conditions.values().cloned().collect()
    }

    /// Record the desired state of one condition.
    ///
    /// The transition time only moves when the status does. Writing a
    /// condition identical to the stored one leaves the entry untouched.
    pub fn set(&mut self, type_: &str, status: ConditionStatus, reason: &str, message: &str) {
        if type_.is_empty() {
            return;
        }

        let mut next = Condition {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation: self.observed_generation,
            last_transition_time: self.reconcile_time,
        };

        if let Some(prev) = self.conditions.get(type_) {
            if prev.status == next.status {
                next.last_transition_time = prev.last_transition_time;
            }
            if same(prev, &next) {
                return;
            }
        }

        self.conditions.insert(type_.to_string(), next);
    }

    pub fn is_condition_true(&self, type_: &str) -> bool {
        self.conditions
            .get(type_)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Whether the working copy differs from what was loaded.
    ///
    /// Transition times are ignored; they follow from the other fields.
    pub fn changed(&self) -> bool {
        if self.original.len() != self.conditions.len() {
            return true;
        }
        self.original.iter().any(|prev| {
            self.conditions
                .get(&prev.type_)
                .map_or(true, |next| !same(prev, next))
        })
    }
}

fn same(prev: &Condition, next: &Condition) -> bool {
    prev.status == next.status
        && prev.reason == next.reason
        && prev.message == next.message
        && prev.observed_generation == next.observed_generation
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn condition(type_: &str, status: ConditionStatus, reason: &str, message: &str) -> Condition {
        Condition {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation: 1,
            last_transition_time: t0(),
        }
    }

    #[test]
    fn test_identical_set_is_a_no_op() {
        let existing = vec![condition("Ready", ConditionStatus::True, "Reconciled", "ok")];
        let mut cs = ConditionSet::new(&existing, 1, t0() + Duration::hours(1));

        cs.set("Ready", ConditionStatus::True, "Reconciled", "ok");

        assert!(!cs.changed());
        assert_eq!(cs.conditions(), existing);
    }

    #[test]
    fn test_message_change_keeps_transition_time() {
        let existing = vec![condition("Ready", ConditionStatus::True, "Reconciled", "ok")];
        let later = t0() + Duration::hours(1);
        let mut cs = ConditionSet::new(&existing, 1, later);

        cs.set("Ready", ConditionStatus::True, "Reconciled", "still ok");

        assert!(cs.changed());
        let out = cs.conditions();
        assert_eq!(out[0].message, "still ok");
        assert_eq!(out[0].last_transition_time, t0());
    }

    #[test]
    fn test_status_change_moves_transition_time() {
        let existing = vec![condition("Ready", ConditionStatus::True, "Reconciled", "ok")];
        let later = t0() + Duration::hours(1);
        let mut cs = ConditionSet::new(&existing, 1, later);

        cs.set("Ready", ConditionStatus::False, "ReconcileError", "fanout failed");

        assert!(cs.changed());
        assert!(!cs.is_condition_true("Ready"));
        assert_eq!(cs.conditions()[0].last_transition_time, later);
    }

    #[test]
    fn test_generation_bump_is_a_change() {
        let existing = vec![condition("Ready", ConditionStatus::True, "Reconciled", "ok")];
        let mut cs = ConditionSet::new(&existing, 2, t0() + Duration::minutes(5));

        cs.set("Ready", ConditionStatus::True, "Reconciled", "ok");

        assert!(cs.changed());
        let out = cs.conditions();
        assert_eq!(out[0].observed_generation, 2);
        assert_eq!(out[0].last_transition_time, t0());
    }

    #[test]
    fn test_new_condition_is_a_change() {
        let mut cs = ConditionSet::new(&[], 1, t0());
        assert!(!cs.changed());

        cs.set("Degraded", ConditionStatus::False, "Reconciled", "ok");

        assert!(cs.changed());
        assert_eq!(cs.conditions()[0].last_transition_time, t0());
    }

    #[test]
    fn test_conditions_sorted_by_type_without_empty_types() {
        let existing = vec![
            condition("ReferenceSecretReady", ConditionStatus::True, "SecretAvailable", ""),
            condition("", ConditionStatus::True, "Bogus", ""),
            condition("Degraded", ConditionStatus::False, "Reconciled", ""),
        ];
        let mut cs = ConditionSet::new(&existing, 1, t0());
        cs.set("Ready", ConditionStatus::True, "Reconciled", "");
        cs.set("", ConditionStatus::False, "Ignored", "");

        let types: Vec<_> = cs.conditions().into_iter().map(|c| c.type_).collect();
        assert_eq!(types, vec!["Degraded", "Ready", "ReferenceSecretReady"]);
    }

    #[test]
    fn test_dropping_an_invalid_entry_counts_as_change() {
        let existing = vec![
            condition("Ready", ConditionStatus::True, "Reconciled", ""),
            condition("", ConditionStatus::True, "Bogus", ""),
        ];
        let cs = ConditionSet::new(&existing, 1, t0());
        assert!(cs.changed());
    }

    #[test]
    fn test_transition_time_alone_is_not_a_change() {
        let mut stored = condition("Ready", ConditionStatus::True, "Reconciled", "ok");
        stored.last_transition_time = t0() - Duration::days(3);
        let cs = ConditionSet::new(&[stored], 1, t0());
        assert!(!cs.changed());
    }

    #[test]
    fn test_is_condition_true_absent() {
        let cs = ConditionSet::new(&[], 1, t0());
        assert!(!cs.is_condition_true("Ready"));
    }
}
