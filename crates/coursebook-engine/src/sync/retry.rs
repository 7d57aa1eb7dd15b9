use std::time::Duration;

/// Bounded exponential backoff for failed saves
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after which saving stops until the next local edit
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Never retry automatically
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before retrying after `failed_attempts` consecutive failures, or
    /// `None` once the budget is spent.
    pub fn backoff(&self, failed_attempts: u32) -> Option<Duration> {
        if failed_attempts == 0 || failed_attempts > self.max_attempts {
            return None;
        }
        let exponent = i32::try_from(failed_attempts - 1).unwrap_or(i32::MAX);
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_backoff.as_secs_f64());
        Some(Duration::try_from_secs_f64(capped).unwrap_or(self.max_backoff))
    }
}
