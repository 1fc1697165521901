//! Exponential-backoff bookkeeping shared by every component that re-attempts
//! a lost outbound connection.
//!
//! The Client Endpoint itself does not reconnect automatically: a dropped
//! socket surfaces once through the close callback and the caller decides
//! whether to retry. Components that do want retries (the Hub's lazy
//! upstream subscriptions, a producer's registration with the Network
//! Manager) drive this policy explicitly around repeated `ClientEndpoint::connect`
//! calls.

use std::time::Duration;

/// Backoff parameters and running state for one reconnect sequence.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    max_retries: Option<u32>,
    retry_count: u32,
    current_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
            max_retries: None,
            retry_count: 0,
            current_delay: initial_delay,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Number of attempts already made.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Resets the sequence after a successful connection.
    pub fn reset(&mut self) {
        self.retry_count = 0;
        self.current_delay = self.initial_delay;
    }

    /// Returns the delay to wait before the next attempt, advancing the
    /// backoff, or `None` if `max_retries` has been exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_retries
            && self.retry_count >= max
        {
            return None;
        }
        let delay = self.current_delay;
        self.retry_count += 1;
        self.current_delay = Duration::from_secs_f64(
            (self.current_delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        );
        Some(delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps_at_max() {
        let mut policy = ReconnectPolicy::new(
            Duration::from_millis(100),
            Duration::from_millis(500),
            2.0,
        );
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn reset_restores_initial_delay() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(50), Duration::from_secs(1), 2.0);
        policy.next_delay();
        policy.next_delay();
        policy.reset();
        assert_eq!(policy.retry_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn max_retries_exhausts() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(10), Duration::from_millis(100), 2.0)
            .with_max_retries(2);
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
    }
}
