//! In-memory sliding-window rate limiter for the enrolment endpoint.
//!
//! The access-code namespace is only 10^6 wide, so `/player/register` gets
//! a per-IP budget. Uses a `DashMap` of timestamp deques per key; expired
//! entries are pruned on access.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

#[derive(Debug)]
pub struct RateLimiter {
    /// key -> request timestamps in ms, oldest first
    windows: DashMap<String, VecDeque<u64>>,
    max_requests: u32,
    window_seconds: u64,
}

impl RateLimiter {
    /// `max_requests` of 0 disables the limiter.
    #[must_use]
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window_seconds,
        }
    }

    /// Returns `Ok(())` if the request is allowed, or `Err(retry_after)`
    /// in seconds.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        if self.max_requests == 0 {
            return Ok(());
        }

        let now_ms = Self::now_ms();
        let window_start_ms = now_ms.saturating_sub(self.window_seconds * 1000);

        let mut entry = self.windows.entry(key.to_string()).or_default();
        let timestamps = entry.value_mut();

        while timestamps.front().is_some_and(|&ts| ts < window_start_ms) {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.max_requests as usize {
            let oldest = timestamps.front().copied().unwrap_or(now_ms);
            let elapsed = now_ms.saturating_sub(oldest);
            let remaining_ms = (self.window_seconds * 1000).saturating_sub(elapsed);
            return Err((remaining_ms / 1000).max(1));
        }

        timestamps.push_back(now_ms);
        Ok(())
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }
}
