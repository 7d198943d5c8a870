//! Probabilistic failure injection for chaos testing.

use rand::Rng;

use billseq_core::{DomainError, DomainResult};

pub const DEFAULT_FAILURE_RATE: f64 = 0.5;

/// Decides whether an operation should be forced to fail.
///
/// Disabled injectors never fire. Enabled ones fire with independent
/// probability `rate` per call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureInjector {
    rate: f64,
    enabled: bool,
}

impl FailureInjector {
    pub fn new(rate: f64, enabled: bool) -> DomainResult<Self> {
        if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
            return Err(DomainError::validation(format!(
                "failure rate must be within 0..=1, got {rate}"
            )));
        }
        Ok(Self { rate, enabled })
    }

    pub fn disabled() -> Self {
        Self {
            rate: DEFAULT_FAILURE_RATE,
            enabled: false,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn should_fail(&self) -> bool {
        self.should_fail_with(&mut rand::thread_rng())
    }

    pub fn should_fail_with<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.enabled && rng.gen_range(0.0..1.0) < self.rate
    }
}
