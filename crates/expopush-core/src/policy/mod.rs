//! Dispatch policies applied around every handler call.
//!
//! ```text
//! Batch → [worker slot] → [RateLimiter] → handler → outcome
//! ```

pub mod rate_limiter;

pub use rate_limiter::{RateLimitConfig, RateLimiter};
