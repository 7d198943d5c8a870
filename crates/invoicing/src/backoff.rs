//! Exponential backoff with a ceiling.

use std::time::Duration;

use billseq_core::{DomainError, DomainResult};

/// Default delay after the first failed attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);

/// Default upper bound for any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// `delay(attempt) = min(base * 2^(attempt - 1), cap)`.
///
/// Attempts are 1-indexed. No jitter: the same attempt always yields the
/// same delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            cap: DEFAULT_MAX_DELAY,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> DomainResult<Self> {
        if base.is_zero() {
            return Err(DomainError::validation("base backoff delay must be > 0"));
        }
        if cap < base {
            return Err(DomainError::validation(
                "max backoff delay must be >= base backoff delay",
            ));
        }
        Ok(Self { base, cap })
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay to wait after failed attempt number `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        2u32.checked_pow(attempt - 1)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}
