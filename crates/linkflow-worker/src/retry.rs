// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retry policy: exponential backoff with jitter and retry classification.

use std::time::Duration;

use rand::Rng;

use crate::executor::ErrorKind;

/// Retry policy for failed work.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied per attempt.
    pub backoff_coefficient: f64,
    /// Upper bound on the computed delay.
    pub maximum_interval: Duration,
    /// Attempts after which retrying stops; 0 means unlimited.
    pub maximum_attempts: i32,
    /// Error types that are never retried, whatever their kind.
    pub non_retryable_error_types: Vec<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
            maximum_attempts: 3,
            non_retryable_error_types: Vec::new(),
        }
    }
}

impl Policy {
    /// Backoff before retrying `attempt` (1-based):
    /// `clamp(initial · coeff^(attempt-1), ≤ maximum)` with uniform jitter
    /// in [0.8, 1.2].
    pub fn next_retry_delay(&self, attempt: i32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        self.delay_with_jitter_factor(attempt, jitter)
    }

    /// Backoff with an explicit symmetric jitter percentage in [0, 1]:
    /// the delay is multiplied by a uniform factor in
    /// [1 - percent, 1 + percent].
    pub fn next_retry_delay_with_jitter(&self, attempt: i32, jitter_percent: f64) -> Duration {
        let percent = jitter_percent.clamp(0.0, 1.0);
        let jitter = rand::thread_rng().gen_range((1.0 - percent)..=(1.0 + percent));
        self.delay_with_jitter_factor(attempt, jitter)
    }

    /// The clamped base delay for `attempt`, before jitter.
    pub fn base_delay(&self, attempt: i32) -> Duration {
        if attempt <= 0 {
            return self.initial_interval;
        }
        let multiplier = self.backoff_coefficient.powi(attempt - 1);
        let base = self.initial_interval.as_secs_f64() * multiplier;
        Duration::from_secs_f64(base.min(self.maximum_interval.as_secs_f64()))
    }

    fn delay_with_jitter_factor(&self, attempt: i32, jitter: f64) -> Duration {
        Duration::from_secs_f64((self.base_delay(attempt).as_secs_f64() * jitter).max(0.0))
    }

    /// Whether another attempt should run after a failure.
    pub fn should_retry(&self, attempt: i32, kind: ErrorKind, error_type: &str) -> bool {
        if kind == ErrorKind::NonRetryable {
            return false;
        }
        if self.maximum_attempts > 0 && attempt >= self.maximum_attempts {
            return false;
        }
        if !error_type.is_empty()
            && self
                .non_retryable_error_types
                .iter()
                .any(|t| t == error_type)
        {
            return false;
        }
        true
    }
}
