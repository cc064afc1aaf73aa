//! Bounded retry policy shared by feed reconnection and notification delivery
//!
//! A [`RetryPolicy`] is the static description (attempt budget, delay growth,
//! jitter); a [`Backoff`] is the per-loop state walking through it. With
//! `multiplier = 1.0` and no jitter the policy is a plain fixed-delay retry.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy `{max_attempts, backoff}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (None = unlimited)
    pub max_attempts: Option<usize>,
    /// Delay before the first retry, milliseconds
    pub initial_delay_ms: u64,
    /// Ceiling for any single delay, milliseconds
    pub max_delay_ms: u64,
    /// Growth factor per attempt (1.0 = fixed delay)
    pub multiplier: f64,
    /// Randomization around each delay (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::feed_reconnect()
    }
}

impl RetryPolicy {
    /// Fixed delay, bounded attempts
    pub fn fixed(delay: Duration, max_attempts: usize) -> Self {
        let delay_ms = delay.as_millis() as u64;
        Self {
            max_attempts: Some(max_attempts),
            initial_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Upstream feed: 15s between attempts, 20 attempts
    pub fn feed_reconnect() -> Self {
        Self::fixed(Duration::from_secs(15), 20)
    }

    /// Push notifications: 10s between attempts, 5 attempts
    pub fn notification() -> Self {
        Self::fixed(Duration::from_secs(10), 5)
    }

    /// Create a configuration with unlimited retries
    pub fn unlimited() -> Self {
        Self {
            max_attempts: None,
            ..Self::feed_reconnect()
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.multiplier < 1.0 || !self.multiplier.is_finite() {
            return Err(format!("retry multiplier must be >= 1.0, got {}", self.multiplier));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(format!(
                "retry jitter_factor must be within [0, 1], got {}",
                self.jitter_factor
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err("retry max_delay_ms must be >= initial_delay_ms".to_string());
        }
        Ok(())
    }
}

/// Retry state machine walking a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    current_attempt: usize,
    current_delay: Duration,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            current_delay: policy.initial_delay(),
            current_attempt: 0,
            policy,
        }
    }

    /// Get the next delay duration and advance the backoff state
    ///
    /// Returns None once the attempt budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }

        let delay = self.delay_with_jitter();

        self.current_attempt += 1;
        self.current_delay = std::cmp::min(
            Duration::from_secs_f64(self.current_delay.as_secs_f64() * self.policy.multiplier),
            self.policy.max_delay(),
        );

        Some(delay)
    }

    fn delay_with_jitter(&self) -> Duration {
        if self.policy.jitter_factor == 0.0 {
            return self.current_delay;
        }

        let mut rng = rand::thread_rng();
        let jitter = rng.gen::<f64>() * self.policy.jitter_factor;
        let jitter_multiplier = 1.0 + (jitter - self.policy.jitter_factor / 2.0);

        Duration::from_secs_f64(self.current_delay.as_secs_f64() * jitter_multiplier)
    }

    /// Reset the backoff to initial state
    pub fn reset(&mut self) {
        self.current_attempt = 0;
        self.current_delay = self.policy.initial_delay();
    }

    /// Attempts consumed so far
    pub fn attempt_number(&self) -> usize {
        self.current_attempt
    }

    /// Check if more retries are available
    pub fn can_retry(&self) -> bool {
        match self.policy.max_attempts {
            Some(max) => self.current_attempt < max,
            None => true,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
