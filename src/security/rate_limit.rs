//! Fixed-window rate limiting.
//!
//! Each key owns one [`RateLimitEntry`]. The first request of a window creates
//! the entry; later requests increment it until `reset_time` passes, after
//! which the next request starts a fresh window. Expired entries are swept
//! with a small probability on each check and by the hourly housekeeping task.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::{Environment, KeyGenerator, RateLimitConfig};

/// Key used when every client shares a single bucket.
pub const CONSTANT_KEY: &str = "global";

/// Counter for one key in one window.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitEntry {
    pub key: String,
    pub count: u32,
    /// Window start, epoch milliseconds.
    pub window_start: i64,
    /// Window end, epoch milliseconds. Fixed for the entry's lifetime.
    pub reset_time: i64,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Window end, epoch milliseconds.
    pub reset_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-process fixed-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Count a request against `key` and decide whether it may proceed.
    pub fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitDecision {
        let now = self.clock.now_ms();
        let window_ms = i64::try_from(config.window_ms).unwrap_or(i64::MAX);
        let limit = config.max_requests;

        let (count, reset_time) = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if now > entry.reset_time {
                    *entry = new_entry(key, now, window_ms);
                } else {
                    entry.count = entry.count.saturating_add(1);
                }
                (entry.count, entry.reset_time)
            }
            Entry::Vacant(vacant) => {
                let entry = vacant.insert(new_entry(key, now, window_ms));
                (entry.count, entry.reset_time)
            }
        };

        // The map guard is released above; sweeping re-locks every shard.
        if config.cleanup_probability > 0.0
            && rand::thread_rng().gen_bool(config.cleanup_probability.min(1.0))
        {
            self.sweep_expired();
        }

        if count > limit {
            let retry_after = ((reset_time - now).max(0) as u64).div_ceil(1000);
            RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_time,
                retry_after_secs: Some(retry_after),
                error: Some(format!(
                    "Rate limit exceeded. Try again in {} seconds.",
                    retry_after
                )),
            }
        } else {
            RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit - count,
                reset_time,
                retry_after_secs: None,
                error: None,
            }
        }
    }

    /// Delete every entry whose window has elapsed. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.reset_time >= now);
        before.saturating_sub(self.entries.len())
    }

    /// Snapshot of the entry for `key`, if any.
    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (keys at or over `limit`, total requests counted in live windows)
    pub fn usage(&self, limit: u32) -> (usize, u64) {
        let mut hits = 0;
        let mut total = 0u64;
        for r in self.entries.iter() {
            if r.count >= limit {
                hits += 1;
            }
            total += u64::from(r.count);
        }
        (hits, total)
    }
}

fn new_entry(key: &str, now: i64, window_ms: i64) -> RateLimitEntry {
    RateLimitEntry {
        key: key.to_string(),
        count: 1,
        window_start: now,
        reset_time: now.saturating_add(window_ms),
    }
}

/// Derive the rate-limit key for a request.
///
/// An explicit user id wins over the network-derived IP. Outside production
/// every request shares [`CONSTANT_KEY`].
pub fn derive_key(
    generator: KeyGenerator,
    environment: Environment,
    user_id: Option<&str>,
    ip: &str,
) -> String {
    if !environment.is_production() {
        return CONSTANT_KEY.to_string();
    }
    match generator {
        KeyGenerator::Constant => CONSTANT_KEY.to_string(),
        KeyGenerator::Ip => format!("ip:{}", ip),
        KeyGenerator::UserOrIp => match user_id.filter(|u| !u.is_empty()) {
            Some(user) => format!("user:{}", user),
            None => format!("ip:{}", ip),
        },
    }
}
