//! Immutable retry policy shared by every attempt of one operation.

use super::classify::{MessagePatterns, RetryClassifier};
use super::delay::DelayPolicy;
use crate::error::{ErrorClass, TerminalReason};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then run the next attempt.
    RetryAfter(Duration),
    /// Stop; the failure is terminal.
    GiveUp(TerminalReason),
}

/// Returned by [`RetryPolicy::execute`] when the operation never succeeded.
#[derive(Debug)]
pub struct GaveUp<E> {
    /// The last error the operation produced.
    pub error: E,
    /// How many times the operation ran.
    pub attempts: u32,
    /// Why the loop stopped.
    pub reason: TerminalReason,
}

/// Retry limits, delay curve and classifier, fixed at construction.
///
/// `max_retries` counts retries after the initial attempt: a policy with
/// `max_retries == 2` runs the operation at most three times. Cloning is
/// cheap; the classifier and any custom delay function are shared.
///
/// # Examples
///
/// ```rust
/// use steadyload_core::retry::{DelayPolicy, RetryPolicy};
///
/// let policy = RetryPolicy::builder()
///     .max_retries(2)
///     .delay(DelayPolicy::fixed_ms(1000))
///     .build();
///
/// assert_eq!(policy.max_attempts(), 3);
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: DelayPolicy,
    classifier: Arc<dyn RetryClassifier>,
}

impl RetryPolicy {
    /// Create a new builder.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Retries allowed after the initial attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// The delay curve.
    pub fn delay_policy(&self) -> &DelayPolicy {
        &self.delay
    }

    /// Wait before retry number `retry` (1-indexed).
    pub fn delay(&self, retry: u32) -> Duration {
        self.delay.delay(retry)
    }

    /// Classify a failure with this policy's classifier.
    pub fn classify(&self, error: &(dyn StdError + 'static)) -> ErrorClass {
        self.classifier.classify(error)
    }

    /// Decide what follows a failure of attempt `attempt_index` (0-indexed).
    pub fn decide(&self, attempt_index: u32, error: &(dyn StdError + 'static)) -> RetryDecision {
        if !self.classify(error).is_transient() {
            return RetryDecision::GiveUp(TerminalReason::NotRetriable);
        }
        if attempt_index >= self.max_retries {
            return RetryDecision::GiveUp(TerminalReason::RetriesExhausted);
        }
        RetryDecision::RetryAfter(self.delay(attempt_index + 1))
    }

    /// Run an async operation until it succeeds or the policy gives up,
    /// sleeping between attempts.
    ///
    /// Attempts are strictly sequential: the next one starts only after the
    /// previous failure was classified and its delay elapsed.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, GaveUp<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => match self.decide(attempt, &error) {
                    RetryDecision::GiveUp(reason) => {
                        return Err(GaveUp {
                            error,
                            attempts: attempt + 1,
                            reason,
                        });
                    }
                    RetryDecision::RetryAfter(delay) => {
                        tracing::debug!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicyBuilder::default().build()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryPolicy`].
///
/// Defaults: two retries, a fixed one-second delay, and the built-in
/// [`MessagePatterns`] classifier.
#[derive(Default)]
pub struct RetryPolicyBuilder {
    max_retries: Option<u32>,
    delay: Option<DelayPolicy>,
    classifier: Option<Arc<dyn RetryClassifier>>,
}

impl RetryPolicyBuilder {
    /// Set the number of retries after the initial attempt.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the delay curve.
    pub fn delay(mut self, delay: impl Into<DelayPolicy>) -> Self {
        self.delay = Some(delay.into());
        self
    }

    /// Set the classifier.
    pub fn classifier<C>(mut self, classifier: C) -> Self
    where
        C: RetryClassifier + 'static,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Set an already shared classifier.
    pub fn shared_classifier(mut self, classifier: Arc<dyn RetryClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Build the policy.
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(2),
            delay: self.delay.unwrap_or_default(),
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(MessagePatterns::default())),
        }
    }
}
