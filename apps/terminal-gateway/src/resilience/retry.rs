//! Bounded retry execution for terminal calls.
//!
//! Two variants wrap a unit of async work:
//!
//! - [`retry_until_valid`] re-runs the work until a validity predicate accepts
//!   the result. When no attempt is accepted it still hands back the last
//!   result, tagged [`Validity::LastObserved`]. It never fails, so callers
//!   must check the value themselves. It does not sleep after the last
//!   rejected attempt, so a fully rejected run waits `attempts - 1` delays.
//! - [`retry_with_final_attempt`] re-runs work that returns `Result` for a
//!   number of guarded attempts, then makes one more unguarded attempt whose
//!   error is returned to the caller. Worst case the work runs `attempts + 1`
//!   times.
//!
//! [`retry_tiered`] chains the second variant over a [`RetryTiers`] schedule
//! with escalating delays, stopping at the first success.
//!
//! Failures are not classified: a malformed request is retried exactly like
//! a dropped connection.
//!
//! # Example
//!
//! ```rust,ignore
//! use terminal_gateway::resilience::{RetryMessages, RetryTiers, retry_tiered};
//!
//! let messages = RetryMessages::new("initialize", "initialize failed", "giving up");
//! let session = retry_tiered(&RetryTiers::default(), &messages, || terminal.initialize()).await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Invalid retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryPolicyError {
    /// Attempt count below one.
    #[error("retry attempts must be at least 1")]
    ZeroAttempts,
    /// Tier schedule without tiers.
    #[error("retry tier schedule must contain at least one tier")]
    EmptyTiers,
    /// A tier waits less than the tier before it.
    #[error("retry tier {index} has a shorter delay than the tier before it")]
    DecreasingDelay {
        /// Zero-based index of the offending tier.
        index: usize,
    },
}

// =============================================================================
// Policies
// =============================================================================

/// Attempt count and inter-attempt delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    ///
    /// # Errors
    ///
    /// Returns [`RetryPolicyError::ZeroAttempts`] if `attempts` is zero.
    pub const fn new(attempts: u32, delay: Duration) -> Result<Self, RetryPolicyError> {
        if attempts == 0 {
            return Err(RetryPolicyError::ZeroAttempts);
        }
        Ok(Self { attempts, delay })
    }

    /// Build a tier from constants known to be valid.
    const fn tier(attempts: u32, delay_ms: u64) -> Self {
        Self {
            attempts,
            delay: Duration::from_millis(delay_ms),
        }
    }

    /// Attempt count, always at least one.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

/// Ordered retry policies with non-decreasing delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTiers {
    leading: Vec<RetryPolicy>,
    last: RetryPolicy,
}

impl Default for RetryTiers {
    /// Three attempts each at 0 ms, 100 ms, 600 ms and 1100 ms.
    fn default() -> Self {
        Self {
            leading: vec![
                RetryPolicy::tier(3, 0),
                RetryPolicy::tier(3, 100),
                RetryPolicy::tier(3, 600),
            ],
            last: RetryPolicy::tier(3, 1100),
        }
    }
}

impl RetryTiers {
    /// Create a schedule from ordered tiers.
    ///
    /// # Errors
    ///
    /// Returns an error if `tiers` is empty or a delay decreases.
    pub fn new(tiers: Vec<RetryPolicy>) -> Result<Self, RetryPolicyError> {
        if let Some(index) = tiers
            .windows(2)
            .position(|pair| pair[1].delay < pair[0].delay)
        {
            return Err(RetryPolicyError::DecreasingDelay { index: index + 1 });
        }

        let mut leading = tiers;
        let last = leading.pop().ok_or(RetryPolicyError::EmptyTiers)?;
        Ok(Self { leading, last })
    }

    /// A schedule with a single tier.
    #[must_use]
    pub const fn single(policy: RetryPolicy) -> Self {
        Self {
            leading: Vec::new(),
            last: policy,
        }
    }

    /// Tiers in escalation order.
    pub fn iter(&self) -> impl Iterator<Item = &RetryPolicy> {
        self.leading.iter().chain(std::iter::once(&self.last))
    }

    /// Number of tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leading.len() + 1
    }

    /// Always false; a schedule holds at least one tier.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Worst-case invocations of the work when chained with
    /// [`retry_tiered`].
    #[must_use]
    pub fn max_invocations(&self) -> u32 {
        self.iter().map(|tier| tier.attempts() + 1).sum()
    }
}

/// Diagnostic text for [`retry_with_final_attempt`]. Has no effect on
/// behavior.
#[derive(Debug, Clone, Copy)]
pub struct RetryMessages<'a> {
    /// Operation name for log fields.
    pub operation: &'a str,
    /// Logged on every failed guarded attempt.
    pub on_attempt: &'a str,
    /// Logged when the final unguarded attempt fails.
    pub on_exhausted: &'a str,
}

impl<'a> RetryMessages<'a> {
    /// Create retry messages.
    #[must_use]
    pub const fn new(operation: &'a str, on_attempt: &'a str, on_exhausted: &'a str) -> Self {
        Self {
            operation,
            on_attempt,
            on_exhausted,
        }
    }
}

// =============================================================================
// Validity-checked retry
// =============================================================================

/// Result of [`retry_until_valid`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Validity<T> {
    /// An attempt satisfied the predicate.
    Accepted(T),
    /// No attempt satisfied the predicate; this is the last result computed.
    LastObserved(T),
}

impl<T> Validity<T> {
    /// Whether the predicate accepted the value.
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// The value, accepted or not.
    pub fn into_inner(self) -> T {
        match self {
            Self::Accepted(value) | Self::LastObserved(value) => value,
        }
    }
}

/// Run `work` until `is_valid` accepts its result, up to
/// `policy.attempts()` times, sleeping `policy.delay()` between attempts.
///
/// Never fails: after the last rejected attempt the last result is returned
/// as [`Validity::LastObserved`].
pub async fn retry_until_valid<T, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    mut is_valid: P,
    mut work: F,
) -> Validity<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: FnMut(&T) -> bool,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        let result = work().await;
        if is_valid(&result) {
            return Validity::Accepted(result);
        }

        tracing::warn!(operation, attempt, attempts, "Result failed validity check");

        if attempt >= attempts {
            return Validity::LastObserved(result);
        }

        pause(policy.delay()).await;
        attempt += 1;
    }
}

// =============================================================================
// Exception-tolerant retry
// =============================================================================

/// Run `work` up to `policy.attempts()` times, swallowing errors, then once
/// more without swallowing.
///
/// # Errors
///
/// Returns the error of the final unguarded attempt.
pub async fn retry_with_final_attempt<T, E, F, Fut>(
    policy: &RetryPolicy,
    messages: &RetryMessages<'_>,
    mut work: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    for attempt in 1..=policy.attempts() {
        match work().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(
                    operation = messages.operation,
                    attempt,
                    error = %e,
                    "{}",
                    messages.on_attempt
                );
                pause(policy.delay()).await;
            }
        }
    }

    work().await.inspect_err(|e| {
        tracing::error!(
            operation = messages.operation,
            attempts = policy.attempts() + 1,
            error = %e,
            "{}",
            messages.on_exhausted
        );
    })
}

/// Chain [`retry_with_final_attempt`] over each tier, stopping at the first
/// success.
///
/// # Errors
///
/// Returns the error of the last tier's final unguarded attempt.
pub async fn retry_tiered<T, E, F, Fut>(
    tiers: &RetryTiers,
    messages: &RetryMessages<'_>,
    mut work: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    for (index, tier) in tiers.leading.iter().enumerate() {
        match retry_with_final_attempt(tier, messages, &mut work).await {
            Ok(value) => return Ok(value),
            Err(_) => {
                tracing::warn!(
                    operation = messages.operation,
                    tier = index + 1,
                    next_tier = index + 2,
                    "Retry tier exhausted, escalating"
                );
            }
        }
    }

    retry_with_final_attempt(&tiers.last, messages, &mut work).await
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
