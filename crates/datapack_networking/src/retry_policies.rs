//! Reexports the trait [`RetryPolicy`] from the `retry_policies` crate as well as all
//! implementations.
//!
//! Retries only ever apply to transient transport failures (connection resets, 5xx responses).
//! Integrity failures and conflicts are never retried.

pub use retry_policies::{policies::*, Jitter, RetryDecision, RetryPolicy};

/// Returns the default retry policy for requests against the index and the blob store.
pub fn default_retry_policy() -> ExponentialBackoff {
    ExponentialBackoff::builder().build_with_max_retries(3)
}
