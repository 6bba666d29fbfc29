//! Reconnect policy: bounded attempts with capped exponential backoff.

use std::time::Duration;

/// Configuration for automatic reconnection.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive reconnection attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Create a new reconnect configuration with the defaults
    /// (5 attempts, 1 s initial delay doubling up to 30 s).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of reconnection attempts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the initial delay between reconnection attempts.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between reconnection attempts.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier for exponential backoff.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// `min(initial_delay * multiplier^attempt, max_delay)`, no jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = base_delay_ms * self.backoff_multiplier.powi(exponent);
        let max_ms = self.max_delay.as_millis() as f64;

        Duration::from_millis(delay_ms.min(max_ms).max(0.0) as u64)
    }
}

/// What to do after the connection closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnect after `delay`. `attempt` is the 0-indexed attempt number.
    Retry { attempt: u32, delay: Duration },
    /// The ceiling was reached; stop reconnecting.
    GiveUp,
}

/// Counts consecutive failed connections and decides whether to retry.
#[derive(Clone, Debug)]
pub struct ReconnectTracker {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectTracker {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Consecutive reconnects scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Whether the ceiling has been reached.
    pub fn exhausted(&self) -> bool {
        self.attempts >= self.config.max_attempts
    }

    /// A connection opened successfully.
    pub fn on_open(&mut self) {
        self.attempts = 0;
    }

    /// A connection closed (or failed to open).
    ///
    /// The counter is incremented before the retry is handed out, and
    /// never exceeds `max_attempts`.
    pub fn on_close(&mut self) -> ReconnectDecision {
        if self.exhausted() {
            return ReconnectDecision::GiveUp;
        }

        let attempt = self.attempts;
        self.attempts += 1;
        ReconnectDecision::Retry {
            attempt,
            delay: self.config.delay_for_attempt(attempt),
        }
    }

    /// Forget previous failures, e.g. before a manual reconnect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
