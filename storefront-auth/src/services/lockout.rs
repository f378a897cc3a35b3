//! Per-identifier failed-login tracking.
//!
//! An identifier is locked once it accumulates `max_attempts` failures whose
//! most recent one is younger than `window`. The lock lifts on its own when the
//! window elapses, and any successful login clears the record.
//!
//! Logins go through [`LoginAttemptTracker::begin_attempt`], which checks the lock
//! and counts the attempt as a failure in one step. Concurrent guesses for one
//! identifier therefore cannot all slip past the check before any of them is
//! counted. A successful login then clears the record.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;

use crate::config::LockoutSettings;
use crate::services::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub window: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::minutes(15),
        }
    }
}

impl From<&LockoutSettings> for LockoutPolicy {
    fn from(settings: &LockoutSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            window: Duration::seconds(settings.window_seconds as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginAttemptRecord {
    pub failure_count: u32,
    pub last_attempt_at: DateTime<Utc>,
}

/// Result of [`LoginAttemptTracker::begin_attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptAdmission {
    /// The attempt may proceed and is already counted as a failure.
    Admitted { failures: u32 },
    Locked { until: DateTime<Utc> },
}

#[async_trait]
pub trait LoginAttemptTracker: Send + Sync {
    /// Atomically refuses a locked identifier or counts this attempt as a failure.
    async fn begin_attempt(&self, identifier: &str) -> Result<AttemptAdmission, anyhow::Error>;
    /// Returns the failure count after this attempt.
    async fn record_failure(&self, identifier: &str) -> Result<u32, anyhow::Error>;
    async fn record_success(&self, identifier: &str) -> Result<(), anyhow::Error>;
    /// When the current lock lifts, or `None` if the identifier is not locked.
    async fn locked_until(
        &self,
        identifier: &str,
    ) -> Result<Option<DateTime<Utc>>, anyhow::Error>;
    async fn failure_count(&self, identifier: &str) -> Result<u32, anyhow::Error>;

    async fn is_locked(&self, identifier: &str) -> Result<bool, anyhow::Error> {
        Ok(self.locked_until(identifier).await?.is_some())
    }

    /// Drops records whose window has elapsed. Returns how many were removed.
    async fn prune_expired(&self) -> Result<usize, anyhow::Error> {
        Ok(0)
    }
}

/// Single-process tracker. Every read-modify-write holds the shard lock for its key,
/// so concurrent failures for one identifier are never lost.
pub struct InMemoryLoginAttemptTracker {
    records: DashMap<String, LoginAttemptRecord>,
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
}

impl InMemoryLoginAttemptTracker {
    pub fn new(policy: LockoutPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.records.len()
    }

    fn expired(&self, record: &LoginAttemptRecord, now: DateTime<Utc>) -> bool {
        now - record.last_attempt_at >= self.policy.window
    }

    fn warn_if_engaged(&self, identifier: &str, count: u32) {
        if count == self.policy.max_attempts {
            tracing::warn!(
                identifier = %identifier,
                failures = count,
                "Login lockout engaged"
            );
        }
    }
}

#[async_trait]
impl LoginAttemptTracker for InMemoryLoginAttemptTracker {
    async fn begin_attempt(&self, identifier: &str) -> Result<AttemptAdmission, anyhow::Error> {
        let now = self.clock.now();
        let mut record = self
            .records
            .entry(identifier.to_string())
            .or_insert(LoginAttemptRecord {
                failure_count: 0,
                last_attempt_at: now,
            });

        if self.expired(&record, now) {
            record.failure_count = 0;
        } else if record.failure_count >= self.policy.max_attempts {
            return Ok(AttemptAdmission::Locked {
                until: record.last_attempt_at + self.policy.window,
            });
        }
        record.failure_count = record.failure_count.saturating_add(1);
        record.last_attempt_at = now;
        let failures = record.failure_count;
        drop(record);

        self.warn_if_engaged(identifier, failures);
        Ok(AttemptAdmission::Admitted { failures })
    }

    async fn record_failure(&self, identifier: &str) -> Result<u32, anyhow::Error> {
        let now = self.clock.now();
        let mut record = self
            .records
            .entry(identifier.to_string())
            .or_insert(LoginAttemptRecord {
                failure_count: 0,
                last_attempt_at: now,
            });

        if self.expired(&record, now) {
            record.failure_count = 0;
        }
        record.failure_count = record.failure_count.saturating_add(1);
        record.last_attempt_at = now;
        let count = record.failure_count;
        drop(record);

        self.warn_if_engaged(identifier, count);
        Ok(count)
    }

    async fn record_success(&self, identifier: &str) -> Result<(), anyhow::Error> {
        self.records.remove(identifier);
        Ok(())
    }

    async fn locked_until(
        &self,
        identifier: &str,
    ) -> Result<Option<DateTime<Utc>>, anyhow::Error> {
        let now = self.clock.now();
        match self.records.entry(identifier.to_string()) {
            Entry::Occupied(entry) => {
                let record = *entry.get();
                if self.expired(&record, now) {
                    entry.remove();
                    Ok(None)
                } else if record.failure_count >= self.policy.max_attempts {
                    Ok(Some(record.last_attempt_at + self.policy.window))
                } else {
                    Ok(None)
                }
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    async fn failure_count(&self, identifier: &str) -> Result<u32, anyhow::Error> {
        let now = self.clock.now();
        Ok(self
            .records
            .get(identifier)
            .filter(|record| !self.expired(record, now))
            .map(|record| record.failure_count)
            .unwrap_or(0))
    }

    async fn prune_expired(&self) -> Result<usize, anyhow::Error> {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, record| !self.expired(record, now));
        Ok(before.saturating_sub(self.records.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;

    fn tracker() -> (Arc<ManualClock>, Arc<InMemoryLoginAttemptTracker>) {
        let clock = Arc::new(ManualClock::default());
        let tracker = Arc::new(InMemoryLoginAttemptTracker::new(
            LockoutPolicy::default(),
            clock.clone(),
        ));
        (clock, tracker)
    }

    #[tokio::test]
    async fn locks_after_five_failures() {
        let (_, tracker) = tracker();

        for expected in 1..=4 {
            assert_eq!(tracker.record_failure("a@b.com").await.unwrap(), expected);
            assert!(!tracker.is_locked("a@b.com").await.unwrap());
        }

        tracker.record_failure("a@b.com").await.unwrap();
        assert!(tracker.is_locked("a@b.com").await.unwrap());
        assert!(!tracker.is_locked("other@b.com").await.unwrap());
    }

    #[tokio::test]
    async fn lock_lifts_after_window() {
        let (clock, tracker) = tracker();
        for _ in 0..5 {
            tracker.record_failure("a@b.com").await.unwrap();
        }

        clock.advance(Duration::minutes(14));
        assert!(tracker.is_locked("a@b.com").await.unwrap());

        clock.advance(Duration::minutes(1));
        assert!(!tracker.is_locked("a@b.com").await.unwrap());
        assert_eq!(tracker.failure_count("a@b.com").await.unwrap(), 0);
        assert_eq!(tracker.tracked_identifiers(), 0);
    }

    #[tokio::test]
    async fn locked_until_reports_window_end() {
        let (clock, tracker) = tracker();
        for _ in 0..5 {
            tracker.record_failure("a@b.com").await.unwrap();
        }
        let until = tracker.locked_until("a@b.com").await.unwrap().unwrap();
        assert_eq!(until, clock.now() + Duration::minutes(15));
    }

    #[tokio::test]
    async fn stale_streak_restarts() {
        let (clock, tracker) = tracker();
        for _ in 0..4 {
            tracker.record_failure("a@b.com").await.unwrap();
        }

        clock.advance(Duration::minutes(16));
        assert_eq!(tracker.record_failure("a@b.com").await.unwrap(), 1);
        assert!(!tracker.is_locked("a@b.com").await.unwrap());
    }

    #[tokio::test]
    async fn success_clears_record() {
        let (_, tracker) = tracker();
        for _ in 0..3 {
            tracker.record_failure("a@b.com").await.unwrap();
        }

        tracker.record_success("a@b.com").await.unwrap();
        assert_eq!(tracker.failure_count("a@b.com").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_failures_are_all_counted() {
        let (_, tracker) = tracker();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.record_failure("a@b.com").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(tracker.failure_count("a@b.com").await.unwrap(), 50);
        assert!(tracker.is_locked("a@b.com").await.unwrap());
    }

    #[tokio::test]
    async fn prune_removes_only_expired() {
        let (clock, tracker) = tracker();
        tracker.record_failure("old@b.com").await.unwrap();
        clock.advance(Duration::minutes(10));
        tracker.record_failure("new@b.com").await.unwrap();
        clock.advance(Duration::minutes(6));

        assert_eq!(tracker.prune_expired().await.unwrap(), 1);
        assert_eq!(tracker.failure_count("new@b.com").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn begin_attempt_counts_until_locked() {
        let (clock, tracker) = tracker();

        for expected in 1..=5 {
            assert_eq!(
                tracker.begin_attempt("a@b.com").await.unwrap(),
                AttemptAdmission::Admitted { failures: expected }
            );
        }
        assert_eq!(
            tracker.begin_attempt("a@b.com").await.unwrap(),
            AttemptAdmission::Locked {
                until: clock.now() + Duration::minutes(15)
            }
        );
        // Refused attempts do not extend the lock.
        assert_eq!(tracker.failure_count("a@b.com").await.unwrap(), 5);

        clock.advance(Duration::minutes(15));
        assert_eq!(
            tracker.begin_attempt("a@b.com").await.unwrap(),
            AttemptAdmission::Admitted { failures: 1 }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_attempts_admit_at_most_the_limit() {
        let (_, tracker) = tracker();

        let handles: Vec<_> = (0..40)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.begin_attempt("a@b.com").await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if let AttemptAdmission::Admitted { .. } = handle.await.unwrap().unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 5);
        assert!(tracker.is_locked("a@b.com").await.unwrap());
    }

    #[test]
    fn policy_from_settings() {
        let policy = LockoutPolicy::from(&LockoutSettings::default());
        assert_eq!(policy, LockoutPolicy::default());
    }
}
