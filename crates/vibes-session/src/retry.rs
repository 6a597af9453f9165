//! Retry policy and per-key backoff timers.
//!
//! Both managers share this scheduler. A key is created on its first failure
//! and removed on success, cancellation or exhaustion:
//!
//! ```text
//! fail ─▶ wait 1s ─▶ due ─▶ fail ─▶ wait 2s ─▶ due ─▶ fail ─▶ wait 4s ─▶ due ─▶ fail ─▶ exhausted
//!                     └─▶ success (key removed)
//! ```
//!
//! Timers advance only through [`RetryScheduler::update`], so a cancelled key
//! can never fire.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Factor applied to the delay after each failed retry.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub const NONE: Self = Self {
        max_retries: 0,
        base_delay_ms: 0,
        multiplier: 1,
    };

    /// Delay before retry number `retry` (1-based), or `None` past the ceiling.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.max_retries {
            return None;
        }
        let factor = u64::from(self.multiplier).saturating_pow(retry - 1);
        Some(Duration::from_millis(self.base_delay_ms.saturating_mul(factor)))
    }

    /// Worst-case time spent waiting across every retry.
    #[must_use]
    pub fn total_delay(&self) -> Duration {
        (1..=self.max_retries).filter_map(|r| self.delay_for(r)).sum()
    }
}

/// Outcome of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`.
    Scheduled {
        /// Retry number (1-based).
        retry: u32,
        /// Wait before the retry becomes due.
        delay: Duration,
    },
    /// Ceiling reached; the key was removed.
    Exhausted {
        /// Attempts made, including the initial one.
        attempts: u32,
    },
}

#[derive(Debug, Clone)]
struct RetryEntry<K> {
    key: K,
    failures: u32,
    remaining: Option<Duration>,
}

/// Backoff timers keyed per retried operation.
#[derive(Debug, Clone)]
pub struct RetryScheduler<K> {
    policy: RetryPolicy,
    entries: Vec<RetryEntry<K>>,
}

impl<K: Clone + PartialEq + std::fmt::Debug> RetryScheduler<K> {
    /// Create an empty scheduler.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            entries: Vec::new(),
        }
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn position(&self, key: &K) -> Option<usize> {
        self.entries.iter().position(|e| &e.key == key)
    }

    /// Record a failed attempt for `key` and arm its next timer.
    pub fn record_failure(&mut self, key: &K) -> RetryDecision {
        let index = if let Some(index) = self.position(key) {
            index
        } else {
            self.entries.push(RetryEntry {
                key: key.clone(),
                failures: 0,
                remaining: None,
            });
            self.entries.len() - 1
        };

        let entry = &mut self.entries[index];
        entry.failures += 1;
        match self.policy.delay_for(entry.failures) {
            Some(delay) => {
                entry.remaining = Some(delay);
                debug!(key = ?key, "Retry {} scheduled in {:?}", entry.failures, delay);
                RetryDecision::Scheduled {
                    retry: entry.failures,
                    delay,
                }
            },
            None => {
                let attempts = entry.failures;
                self.entries.remove(index);
                RetryDecision::Exhausted { attempts }
            },
        }
    }

    /// Forget `key` after a successful attempt.
    pub fn record_success(&mut self, key: &K) {
        self.cancel(key);
    }

    /// Drop `key` and its timer. Returns true if it existed.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.position(key) {
            Some(index) => {
                self.entries.remove(index);
                true
            },
            None => false,
        }
    }

    /// Drop every key matching `predicate`.
    pub fn cancel_where<F: FnMut(&K) -> bool>(&mut self, mut predicate: F) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !predicate(&e.key));
        before - self.entries.len()
    }

    /// Drop every key.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Advance timers by `dt`; returns keys whose retry is now due.
    ///
    /// A due key stays registered (with its failure count) until the caller
    /// records the outcome or cancels it.
    pub fn update(&mut self, dt: Duration) -> Vec<K> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            if let Some(remaining) = entry.remaining {
                let remaining = remaining.saturating_sub(dt);
                if remaining.is_zero() {
                    entry.remaining = None;
                    due.push(entry.key.clone());
                } else {
                    entry.remaining = Some(remaining);
                }
            }
        }
        due
    }

    /// Failed attempts recorded for `key`.
    #[must_use]
    pub fn failures(&self, key: &K) -> u32 {
        self.position(key).map_or(0, |i| self.entries[i].failures)
    }

    /// Whether `key` is registered.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.position(key).is_some()
    }

    /// Whether `key` has a running timer.
    #[must_use]
    pub fn is_waiting(&self, key: &K) -> bool {
        self.position(key)
            .is_some_and(|i| self.entries[i].remaining.is_some())
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no key is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
