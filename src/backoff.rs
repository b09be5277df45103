//! Reconnect Backoff
//!
//! Capped exponential backoff with additive jitter:
//! `min(base * 2^attempt, cap) + U[0, jitter)`.

use rand::Rng;
use std::time::Duration;

/// Reconnect policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on the exponential part
    pub max_delay: Duration,
    /// Upper bound (exclusive) of the random jitter added on top
    pub max_jitter: Duration,
    /// Give up after this many consecutive failed attempts (None = never)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_jitter: Duration::from_millis(1000),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Policy with no jitter, handy for deterministic callers
    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Exponential delay for an attempt, capped, without jitter
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis().min(u64::MAX as u128) as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = base_ms.saturating_mul(factor);
        Duration::from_millis(ms).min(self.max_delay)
    }

    /// Calculate delay for a given attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.capped_delay(attempt) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max))
    }
}

/// Attempt counter driven by a [`ReconnectPolicy`]
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of retries scheduled since the last successful open
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the policy forbids another retry
    pub fn exhausted(&self) -> bool {
        matches!(self.policy.max_attempts, Some(max) if self.attempt >= max)
    }

    /// Delay for the current attempt; advances the counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Called once a connection opens
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}
