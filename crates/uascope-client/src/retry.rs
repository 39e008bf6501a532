// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reconnection backoff policy.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff configuration for reconnect attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Most reconnect attempts before giving up (0 = retry forever).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling on the delay between retries.
    pub max_delay: Duration,
    /// Multiplier applied after each attempt.
    pub multiplier: f64,
    /// Random jitter fraction applied to each delay (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// Starts a fresh backoff sequence.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            config: self.clone(),
            attempt: 0,
            current: self.initial_delay,
        }
    }
}

/// Iterator-like backoff state. `next_delay` returns `None` once the attempt
/// budget is spent.
#[derive(Debug)]
pub struct Backoff {
    config: RetryConfig,
    attempt: u32,
    current: Duration,
}

impl Backoff {
    /// Attempts made so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The delay to sleep before the next attempt, with jitter applied.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts != 0 && self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt += 1;

        let base = self.current;
        let next = base.mul_f64(self.config.multiplier.max(1.0));
        self.current = next.min(self.config.max_delay);

        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return Some(base);
        }
        let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
        Some(base.mul_f64(factor).min(self.config.max_delay))
    }

    /// Resets after a successful connection so the next outage starts from
    /// the initial delay again.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current = self.config.initial_delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            jitter: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_delays_grow_to_ceiling() {
        let mut backoff = no_jitter().backoff();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(500)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_attempt_budget_is_enforced() {
        let config = RetryConfig {
            max_attempts: 2,
            jitter: 0.0,
            ..Default::default()
        };
        let mut backoff = config.backoff();
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = no_jitter().backoff();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig {
            jitter: 0.5,
            ..Default::default()
        };
        let mut backoff = config.backoff();
        for _ in 0..100 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay <= Duration::from_secs(30));
            assert!(delay >= Duration::from_millis(250));
        }
    }
}
