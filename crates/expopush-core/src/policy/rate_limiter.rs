//! Request-start rate limiter.
//!
//! Models a bucket of `permits` tokens where each request start consumes one
//! token and every token comes back exactly `window` after it was taken. At
//! most `permits` starts therefore fall inside any rolling `window`. Callers
//! that find the bucket empty suspend in [`RateLimiter::acquire`] until the
//! oldest token returns.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::EngineError;

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Request starts allowed per window.
    pub permits: u32,
    /// Length of the rolling window.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            permits: 6, // Expo push API: 6 requests per second
            window: Duration::from_secs(1),
        }
    }
}

impl RateLimitConfig {
    pub fn per_second(permits: u32) -> Self {
        Self {
            permits,
            window: Duration::from_secs(1),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.permits == 0 {
            return Err(EngineError::invalid("rate limit permits must be at least 1"));
        }
        if self.window.is_zero() {
            return Err(EngineError::invalid("rate limit window must be greater than 0"));
        }
        Ok(())
    }
}

/// Thread-safe limiter shared by every worker of an engine.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Start times of the tokens currently out of the bucket, oldest first.
    taken: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            taken: Mutex::new(VecDeque::new()),
            config,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Take a token if one is available.
    pub fn try_acquire(&self) -> bool {
        self.take_or_wait().is_none()
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        while let Some(wait) = self.take_or_wait() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Time until the next token returns; zero if one is available now.
    pub fn wait_time(&self) -> Duration {
        let now = Instant::now();
        let mut taken = self.lock();
        self.expire(&mut taken, now);
        self.wait_for(&taken, now)
    }

    /// Tokens available right now.
    pub fn available(&self) -> u32 {
        let mut taken = self.lock();
        self.expire(&mut taken, Instant::now());
        self.config.permits - taken.len() as u32
    }

    fn take_or_wait(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut taken = self.lock();
        self.expire(&mut taken, now);

        if taken.len() < self.config.permits as usize {
            taken.push_back(now);
            None
        } else {
            Some(self.wait_for(&taken, now))
        }
    }

    fn expire(&self, taken: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = taken.front() {
            if now.duration_since(*oldest) >= self.config.window {
                taken.pop_front();
            } else {
                break;
            }
        }
    }

    fn wait_for(&self, taken: &VecDeque<Instant>, now: Instant) -> Duration {
        if taken.len() < self.config.permits as usize {
            return Duration::ZERO;
        }
        taken
            .front()
            .map(|oldest| (*oldest + self.config.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        // The guarded deque is valid after any panic, so poisoning is ignored.
        self.taken.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
