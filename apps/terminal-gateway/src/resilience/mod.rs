//! Resilience patterns for terminal calls.
//!
//! Bounded retries with fixed or escalating delays. There is no
//! cancellation: once a retry loop starts it runs to success, exhaustion or
//! the final unguarded failure.

mod retry;

pub use retry::{
    RetryMessages, RetryPolicy, RetryPolicyError, RetryTiers, Validity, retry_tiered,
    retry_until_valid, retry_with_final_attempt,
};
