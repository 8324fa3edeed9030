//! Log throttling
//!
//! [`LogRateLimiter`] is a process-wide, size-bounded table of fingerprints
//! and the earliest instant each may be logged again. It only bounds log
//! volume: losing it on restart is harmless.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};

/// Capacity used when none (or zero) is configured
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Shared fingerprint gate; build once and hand an `Arc` to every pass
#[derive(Debug)]
pub struct LogRateLimiter {
    capacity: usize,
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Default for LogRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogRateLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        Self {
            capacity,
            entries: Mutex::new(HashMap::with_capacity(capacity.min(1024))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of fingerprints currently tracked
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `fingerprint` may be logged at `now`.
    ///
    /// A non-positive interval always allows and records nothing. A granted
    /// call restarts the window at `now`.
    pub fn allow(&self, fingerprint: &str, now: DateTime<Utc>, interval: TimeDelta) -> bool {
        if interval <= TimeDelta::zero() {
            return true;
        }

        let mut entries = self.lock();

        if let Some(next_allowed) = entries.get(fingerprint) {
            if now < *next_allowed {
                return false;
            }
        }
        entries.insert(fingerprint.to_string(), now + interval);

        if entries.len() > self.capacity {
            prune(&mut entries, self.capacity, now);
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        // The table holds no invariants a panicking holder could break.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drop expired entries, then arbitrary ones until the table fits again
fn prune(entries: &mut HashMap<String, DateTime<Utc>>, capacity: usize, now: DateTime<Utc>) {
    entries.retain(|_, next_allowed| now < *next_allowed);

    if entries.len() > capacity {
        let excess = entries.len() - capacity;
        let victims: Vec<String> = entries.keys().take(excess).cloned().collect();
        for fingerprint in victims {
            entries.remove(&fingerprint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(100, 0).unwrap()
    }

    #[test]
    fn test_non_positive_interval_allows_without_state() {
        let limiter = LogRateLimiter::new(10);

        assert!(limiter.allow("fp", t0(), TimeDelta::zero()));
        assert!(limiter.allow("fp", t0(), TimeDelta::seconds(-1)));
        assert!(limiter.allow("fp", t0(), TimeDelta::zero()));
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_blocks_within_interval() {
        let limiter = LogRateLimiter::new(10);
        let interval = TimeDelta::seconds(10);

        assert!(limiter.allow("fp", t0(), interval));
        assert!(!limiter.allow("fp", t0(), interval));
        assert!(!limiter.allow("fp", t0() + TimeDelta::seconds(9), interval));

        // exactly at the boundary the window is open again
        let t2 = t0() + interval;
        assert!(limiter.allow("fp", t2, interval));

        // the window restarted at t2, not at t0 + 2 * interval
        assert!(!limiter.allow("fp", t2 + TimeDelta::seconds(9), interval));
        assert!(limiter.allow("fp", t2 + interval, interval));
    }

    #[test]
    fn test_late_call_restarts_window_from_grant() {
        let limiter = LogRateLimiter::new(10);
        let interval = TimeDelta::seconds(10);

        assert!(limiter.allow("fp", t0(), interval));
        let late = t0() + TimeDelta::seconds(35);
        assert!(limiter.allow("fp", late, interval));
        assert!(!limiter.allow("fp", t0() + TimeDelta::seconds(40), interval));
        assert!(limiter.allow("fp", late + interval, interval));
    }

    #[test]
    fn test_fingerprints_are_independent() {
        let limiter = LogRateLimiter::new(10);
        let interval = TimeDelta::seconds(10);

        assert!(limiter.allow("a", t0(), interval));
        assert!(limiter.allow("b", t0(), interval));
        assert!(!limiter.allow("a", t0() + TimeDelta::seconds(1), interval));
        assert!(!limiter.allow("b", t0() + TimeDelta::seconds(1), interval));
        assert!(limiter.allow("c", t0() + TimeDelta::seconds(1), interval));
    }

    #[test]
    fn test_zero_capacity_uses_default() {
        assert_eq!(LogRateLimiter::new(0).capacity(), DEFAULT_CAPACITY);
        assert_eq!(LogRateLimiter::default().capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_prune_removes_expired_before_evicting() {
        let limiter = LogRateLimiter::new(3);

        // short-lived entries expire at t0 + 1s
        assert!(limiter.allow("old-1", t0(), TimeDelta::seconds(1)));
        assert!(limiter.allow("old-2", t0(), TimeDelta::seconds(1)));
        // long-lived entry stays blocked for an hour
        assert!(limiter.allow("keep", t0(), TimeDelta::hours(1)));

        let later = t0() + TimeDelta::seconds(5);
        assert!(limiter.allow("new", later, TimeDelta::hours(1)));

        // both expired entries went, nothing live had to be evicted
        assert_eq!(limiter.len(), 2);
        assert!(!limiter.allow("keep", later, TimeDelta::hours(1)));
        assert!(!limiter.allow("new", later, TimeDelta::hours(1)));
    }

    #[test]
    fn test_prune_evicts_arbitrary_entries_to_restore_bound() {
        let limiter = LogRateLimiter::new(4);
        let interval = TimeDelta::hours(1);

        for i in 0..20 {
            assert!(limiter.allow(&format!("fp-{}", i), t0(), interval));
            assert!(limiter.len() <= limiter.capacity());
        }
        assert!(!limiter.is_empty());
    }

    #[test]
    fn test_concurrent_callers_grant_once() {
        let limiter = Arc::new(LogRateLimiter::new(100));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.allow("shared", t0(), TimeDelta::minutes(1)))
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(granted, 1);
    }
}
