//! Reusable resilience primitives.
//!
//! Domain-independent building blocks shared by the sync pipelines: a clock
//! abstraction for deterministic tests, the hourly admission gate that
//! paces upstream traffic, and retry helpers for transient failures.

pub mod resilience;

pub use resilience::{
    Admission, Clock, GateClosed, MockClock, RateGate, RetryPolicy, SystemClock,
    retry_with_backoff,
};
