//! Generic retry with exponential backoff.

use std::future::Future;

use tracing::debug;

use billseq_invoicing::BackoffPolicy;

type AttemptHook<'a, E> = Box<dyn FnMut(u32, &E) + Send + 'a>;
type AbortPredicate<'a, E> = Box<dyn Fn(&E) -> bool + Send + 'a>;

/// Knobs for [`retry_with_backoff`]. The default retries forever.
pub struct RetryOptions<'a, E> {
    max_attempts: Option<u32>,
    on_attempt_fail: Option<AttemptHook<'a, E>>,
    should_abort: Option<AbortPredicate<'a, E>>,
}

impl<E> Default for RetryOptions<'_, E> {
    fn default() -> Self {
        Self {
            max_attempts: None,
            on_attempt_fail: None,
            should_abort: None,
        }
    }
}

impl<'a, E> RetryOptions<'a, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up after this many calls, returning the last error.
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Called with the 1-based attempt number after each retryable failure.
    pub fn on_attempt_fail<F>(mut self, hook: F) -> Self
    where
        F: FnMut(u32, &E) + Send + 'a,
    {
        self.on_attempt_fail = Some(Box::new(hook));
        self
    }

    /// Errors for which this returns `true` are returned at once, without
    /// calling the attempt hook.
    pub fn should_abort<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + 'a,
    {
        self.should_abort = Some(Box::new(predicate));
        self
    }
}

impl<E> core::fmt::Debug for RetryOptions<'_, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("on_attempt_fail", &self.on_attempt_fail.is_some())
            .field("should_abort", &self.should_abort.is_some())
            .finish()
    }
}

/// Run `operation` until it succeeds, sleeping `policy.delay(attempt)`
/// between failures.
///
/// Order on failure: abort check, then hook, then attempt cap, then sleep.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: BackoffPolicy,
    mut options: RetryOptions<'_, E>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if options.should_abort.as_ref().is_some_and(|abort| abort(&err)) {
                    return Err(err);
                }

                if let Some(hook) = options.on_attempt_fail.as_mut() {
                    hook(attempt, &err);
                }

                if options.max_attempts.is_some_and(|max| attempt >= max) {
                    return Err(err);
                }
            }
        }

        let delay = policy.delay(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
        tokio::time::sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }
}
