//! Retry engine: backoff policy, retryability classification, retry loop.
//!
//! This module encapsulates error classification (what is worth repeating,
//! and for which methods) and backoff computation (exponential growth,
//! jitter, server-directed `Retry-After`) so that higher layers share one
//! consistent policy.

mod classify;
mod policy;
mod run;

pub use classify::{is_retryable, parse_retry_after};
pub use policy::RetryPolicy;
pub use run::{with_retry, OnRetry, RetryOptions};
