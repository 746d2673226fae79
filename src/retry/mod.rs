//! Resilient request executor.
//!
//! Every remote call in the system goes through [`RetryExecutor`]: transient
//! failures (network drops, 5xx responses, rate limiting) are retried with
//! exponential backoff, terminal failures (auth, missing resources) fail
//! fast, and the final outcome can be surfaced to the operator through the
//! notifier seam.
//!
//! # Retry Strategy
//!
//! Attempts are 0-indexed. After attempt `i` fails with a retryable error,
//! the executor sleeps `retry_delay_ms * 2^i` (no jitter), then tries again,
//! up to `max_retries + 1` total attempts. Defaults: 3 retries, 1 s base
//! delay, so 1s, 2s, 4s between the four attempts.
//!
//! Retry state lives on the call stack; nothing is shared between calls.

use crate::notify::{Notifier, Severity};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Hook invoked with the final classified error before it is reported.
pub type FailureHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Retry policy for remote operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff (default: 1000).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Whether the final failure is surfaced to the operator (default: true).
    #[serde(default = "default_notify_user")]
    pub notify_user: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            notify_user: default_notify_user(),
        }
    }
}

impl RetryPolicy {
    /// Policy for calls that must not retry or toast (health probes).
    #[must_use]
    pub const fn single_attempt() -> Self {
        Self {
            max_retries: 0,
            retry_delay_ms: 0,
            notify_user: false,
        }
    }

    /// Sets the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff base delay in milliseconds.
    #[must_use]
    pub const fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Enables or disables operator notifications on final failure.
    #[must_use]
    pub const fn with_notifications(mut self, enabled: bool) -> Self {
        self.notify_user = enabled;
        self
    }

    /// Calculates the backoff delay after a failed attempt.
    ///
    /// Formula: `retry_delay_ms * 2^attempt` (attempts are 0-indexed).
    /// The shift is capped at 10 and the multiply saturates, so a misconfig
    /// cannot overflow into a zero delay.
    #[must_use]
    pub const fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let shift = if attempt > 10 { 10 } else { attempt };
        self.retry_delay_ms.saturating_mul(1 << shift)
    }

    /// Total attempts this policy allows.
    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Executes async operations under a [`RetryPolicy`].
///
/// The executor is cheap to construct; build one per call site when a
/// custom fallback or failure hook is needed.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    notifier: Option<Arc<dyn Notifier>>,
    on_failure: Option<FailureHook>,
}

impl RetryExecutor {
    /// Creates an executor with the given policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            notifier: None,
            on_failure: None,
        }
    }

    /// Attaches the operator notification seam.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Attaches a hook invoked with the final error before it is returned.
    #[must_use]
    pub fn with_failure_hook(mut self, hook: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    /// Returns the policy this executor runs under.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `op` until it succeeds or the retry budget is spent.
    ///
    /// A non-retryable failure stops the loop immediately. On final failure
    /// the hook fires first, then the operator notification (if enabled),
    /// then the terminal [`Error::RetriesExhausted`] is returned carrying
    /// the last error's message and retryability.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let total = self.policy.total_attempts();
        let mut attempts_made = 0u32;
        let mut last_error = Error::Transport("Errore sconosciuto".to_string());

        for attempt in 0..total {
            attempts_made = attempt + 1;

            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(operation, attempt = attempts_made, "recovered after retry");
                    }
                    metrics::histogram!("retry.attempts").record(f64::from(attempts_made));
                    return Ok(value);
                },
                Err(error) => {
                    tracing::warn!(
                        operation,
                        attempt = attempts_made,
                        total,
                        error = %error,
                        "attempt failed"
                    );

                    let retryable = error.is_retryable();
                    last_error = error;

                    if !retryable || attempts_made == total {
                        break;
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    tracing::debug!(operation, delay_ms = delay, "backing off before retry");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                },
            }
        }

        metrics::counter!("retry.exhausted").increment(1);
        metrics::histogram!("retry.attempts").record(f64::from(attempts_made));

        if let Some(hook) = &self.on_failure {
            hook(&last_error);
        }

        if self.policy.notify_user {
            if let Some(notifier) = &self.notifier {
                notifier.notify(Severity::Error, &last_error.user_message());
            }
        }

        Err(Error::RetriesExhausted {
            attempts: attempts_made,
            message: last_error.user_message(),
            retryable: last_error.is_retryable(),
        })
    }

    /// Like [`execute`](Self::execute), but a failure yields `fallback`
    /// instead of an error.
    pub async fn execute_with_fallback<T, F, Fut>(&self, operation: &str, op: F, fallback: T) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.execute(operation, op).await {
            Ok(value) => value,
            Err(error) => {
                tracing::info!(operation, error = %error, "using fallback value after failure");
                fallback
            },
        }
    }
}

// Default value functions for serde
const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

const fn default_notify_user() -> bool {
    true
}
