//! Reliability patterns for durable execution
//!
//! This module provides:
//! - [`RetryPolicy`] - Configurable retry with exponential backoff
//! - [`RetryDecision`] - Outcome of applying the policy to a failed attempt

mod retry;

pub use retry::{RetryDecision, RetryPolicy};
