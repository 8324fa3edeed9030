//! Short-circuit for passes with nothing to do

use crate::crd::{
    find_condition, ConditionStatus, IdentitySyncPolicy, CONDITION_DEGRADED, CONDITION_READY,
    CONDITION_REFERENCE_SECRET_READY,
};

/// True when the persisted status already reflects this generation and this
/// source content, so the whole fanout can be skipped
pub fn should_fast_path(policy: &IdentitySyncPolicy, current_secret_hash: &str) -> bool {
    let Some(status) = policy.status.as_ref() else {
        return false;
    };
    let generation = policy.metadata.generation.unwrap_or(0);

    let current = |type_: &str, expected: ConditionStatus| {
        find_condition(&status.conditions, type_).is_some_and(|c| c.is_current(expected, generation))
    };

    current(CONDITION_READY, ConditionStatus::True)
        && current(CONDITION_DEGRADED, ConditionStatus::False)
        && current(CONDITION_REFERENCE_SECRET_READY, ConditionStatus::True)
        && status.observed_source_secret_hash == current_secret_hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::crd::{
        Condition, IdentitySyncPolicySpec, IdentitySyncPolicyStatus, NamespacedNameRef,
        SecretConfig, ServiceAccountConfig,
    };

    fn condition(type_: &str, status: ConditionStatus, generation: i64) -> Condition {
        Condition {
            type_: type_.to_string(),
            status,
            reason: "Reconciled".to_string(),
            message: String::new(),
            observed_generation: generation,
            last_transition_time: Utc::now(),
        }
    }

    fn healthy_conditions(generation: i64) -> Vec<Condition> {
        vec![
            condition(CONDITION_DEGRADED, ConditionStatus::False, generation),
            condition(CONDITION_READY, ConditionStatus::True, generation),
            condition(CONDITION_REFERENCE_SECRET_READY, ConditionStatus::True, generation),
        ]
    }

    fn policy(generation: i64, conditions: Vec<Condition>, hash: &str) -> IdentitySyncPolicy {
        let mut policy = IdentitySyncPolicy::new(
            "p",
            IdentitySyncPolicySpec {
                target_namespaces: vec!["team-a".to_string()],
                service_account: ServiceAccountConfig {
                    name: "sa".to_string(),
                },
                secret: SecretConfig {
                    name: "s".to_string(),
                    source_ref: NamespacedNameRef {
                        name: "src".to_string(),
                        namespace: "platform".to_string(),
                    },
                },
            },
        );
        policy.metadata.generation = Some(generation);
        policy.status = Some(IdentitySyncPolicyStatus {
            conditions,
            observed_source_secret_hash: hash.to_string(),
        });
        policy
    }

    #[test]
    fn test_fast_path_when_current_and_hash_matches() {
        let p = policy(3, healthy_conditions(3), "h1");
        assert!(should_fast_path(&p, "h1"));
    }

    #[test]
    fn test_no_fast_path_when_hash_differs() {
        let p = policy(3, healthy_conditions(3), "h1");
        assert!(!should_fast_path(&p, "h2"));
    }

    #[test]
    fn test_no_fast_path_when_generation_moved() {
        let p = policy(4, healthy_conditions(3), "h1");
        assert!(!should_fast_path(&p, "h1"));
    }

    #[test]
    fn test_no_fast_path_when_degraded() {
        let mut conditions = healthy_conditions(3);
        conditions[0].status = ConditionStatus::True;
        let p = policy(3, conditions, "h1");
        assert!(!should_fast_path(&p, "h1"));
    }

    #[test]
    fn test_no_fast_path_when_a_condition_is_missing() {
        let mut conditions = healthy_conditions(3);
        conditions.pop();
        let p = policy(3, conditions, "h1");
        assert!(!should_fast_path(&p, "h1"));
    }

    #[test]
    fn test_no_fast_path_without_status() {
        let mut p = policy(1, healthy_conditions(1), "h1");
        p.status = None;
        assert!(!should_fast_path(&p, "h1"));
    }
}
