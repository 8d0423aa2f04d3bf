use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use fastrace::future::FutureExt;
use fastrace::Span;
use francine_common::config;
use francine_telemetry::common::SpanAttribute;
use log::{debug, warn};

/// How often, and how far apart, an operation is attempted again
/// after a failure that the caller considers retryable.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    Fixed {
        max_count: usize,
        delay: Duration,
    },
    ExponentialBackoff {
        max_count: usize,
        initial_delay: Duration,
        max_delay: Duration,
        factor: u32,
    },
}

impl RetryStrategy {
    pub fn max_count(&self) -> usize {
        match self {
            Self::Fixed { max_count, .. } | Self::ExponentialBackoff { max_count, .. } => {
                *max_count
            }
        }
    }

    /// The delay before the retry with the given zero-based index.
    pub fn delay(&self, retry: usize) -> Duration {
        match self {
            Self::Fixed { delay, .. } => *delay,
            Self::ExponentialBackoff {
                initial_delay,
                max_delay,
                factor,
                ..
            } => u32::try_from(retry)
                .ok()
                .and_then(|n| factor.checked_pow(n))
                .and_then(|m| initial_delay.checked_mul(m))
                .map_or(*max_delay, |d| d.min(*max_delay)),
        }
    }

    /// Runs the operation, retrying only the errors accepted by `retryable`.
    /// Any other error, or the last error once the retries are used up, is returned.
    pub async fn run<F, Fut, T, E, P>(&self, mut operation: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Display + Send,
        P: Fn(&E) -> bool + Send,
    {
        let mut retry = 0usize;
        loop {
            let span = Span::enter_with_local_parent("RetryStrategy::run")
                .with_property(|| (SpanAttribute::RETRY_ATTEMPT, retry.to_string()));
            let error = match operation()
                .in_span(Span::enter_with_parent("RetryStrategy::attempt", &span))
                .await
            {
                Ok(x) => return Ok(x),
                Err(e) => e,
            };
            span.add_property(|| (SpanAttribute::EXCEPTION_MESSAGE, error.to_string()));
            if !retryable(&error) {
                debug!("operation failed with a non-retryable error: {error}");
                return Err(error);
            }
            if retry >= self.max_count() {
                return Err(error);
            }
            let delay = self.delay(retry);
            warn!(
                "operation failed (attempt {}), retrying in {delay:?}: {error}",
                retry + 1
            );
            drop(span);
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}

impl From<&config::RetryStrategy> for RetryStrategy {
    fn from(config: &config::RetryStrategy) -> Self {
        match config {
            config::RetryStrategy::Fixed(x) => Self::Fixed {
                max_count: x.max_count,
                delay: Duration::from_secs(x.delay_secs),
            },
            config::RetryStrategy::ExponentialBackoff(x) => Self::ExponentialBackoff {
                max_count: x.max_count,
                initial_delay: Duration::from_secs(x.initial_delay_secs),
                max_delay: Duration::from_secs(x.max_delay_secs),
                factor: x.factor,
            },
        }
    }
}
