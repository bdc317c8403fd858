//! Resilience helpers for calls between services.
//!
//! # Design Decisions
//! - Retries are bounded by a configured attempt count
//! - Exponential backoff with jitter keeps retries from synchronising

pub mod backoff;

pub use backoff::RetryPolicy;
