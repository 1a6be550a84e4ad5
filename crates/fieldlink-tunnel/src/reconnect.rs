//! Bounded reconnect bookkeeping

use chrono::{DateTime, Utc};

/// Failed reconnect attempts since the last successful connection
#[derive(Debug, Clone)]
pub struct ReconnectCounter {
    attempts: u32,
    max_attempts: u32,
    last_attempt: Option<DateTime<Utc>>,
}

impl ReconnectCounter {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            last_attempt: None,
        }
    }

    /// Record a failed attempt. Never counts past the maximum.
    pub fn record_failure(&mut self) -> u32 {
        self.attempts = (self.attempts + 1).min(self.max_attempts);
        self.last_attempt = Some(Utc::now());
        self.attempts
    }

    /// Forget all failures after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_attempt = None;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_up_to_maximum() {
        let mut counter = ReconnectCounter::new(3);
        assert!(!counter.is_exhausted());
        assert_eq!(counter.record_failure(), 1);
        assert_eq!(counter.record_failure(), 2);
        assert!(!counter.is_exhausted());
        assert_eq!(counter.record_failure(), 3);
        assert!(counter.is_exhausted());
        assert_eq!(counter.record_failure(), 3);
        assert!(counter.last_attempt().is_some());
    }

    #[test]
    fn test_reset_after_success() {
        let mut counter = ReconnectCounter::new(3);
        counter.record_failure();
        counter.record_failure();
        counter.reset();
        assert_eq!(counter.attempts(), 0);
        assert!(counter.last_attempt().is_none());
    }

    #[test]
    fn test_zero_maximum_is_exhausted() {
        assert!(ReconnectCounter::new(0).is_exhausted());
    }
}
