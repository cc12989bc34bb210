//! Dynamic IP blocklist and abuse escalation.
//!
//! Suspicious requests bump a per-IP counter. When the counter reaches the
//! escalation threshold the IP is blocked for a fixed TTL and the counter is
//! reset. Expiry is checked lazily on every lookup and swept by housekeeping,
//! so a block never outlives its TTL.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::clock::Clock;

/// A temporarily blocked client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockedIp {
    pub ip: String,
    /// Epoch milliseconds.
    pub blocked_at: i64,
    /// Epoch milliseconds.
    pub expires_at: i64,
}

/// Per-IP suspicion count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspicionCounter {
    pub ip: String,
    pub count: u32,
}

/// Result of recording a suspicious hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Counter incremented; still below the threshold.
    Counted(u32),
    /// Threshold reached; the IP is now blocked.
    Blocked,
}

/// `secs` as milliseconds, saturating instead of wrapping.
fn ttl_ms(secs: u64) -> i64 {
    i64::try_from(secs)
        .ok()
        .and_then(|s| s.checked_mul(1000))
        .unwrap_or(i64::MAX)
}

#[derive(Debug)]
pub struct Blocklist {
    blocked: DashMap<String, BlockedIp>,
    suspicion: DashMap<String, u32>,
    clock: Arc<dyn Clock>,
}

impl Blocklist {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            blocked: DashMap::new(),
            suspicion: DashMap::new(),
            clock,
        }
    }

    /// True while `ip` holds an unexpired block. Expired blocks are dropped here.
    pub fn is_blocked(&self, ip: &str) -> bool {
        let now = self.clock.now_ms();
        let expired = match self.blocked.get(ip) {
            Some(entry) if entry.expires_at > now => return true,
            Some(_) => true,
            None => false,
        };
        if expired {
            self.blocked.remove_if(ip, |_, b| b.expires_at <= now);
        }
        false
    }

    /// Block `ip` for `ttl_secs`, replacing any existing block.
    pub fn block(&self, ip: &str, ttl_secs: u64) -> BlockedIp {
        let now = self.clock.now_ms();
        let entry = BlockedIp {
            ip: ip.to_string(),
            blocked_at: now,
            expires_at: now.saturating_add(ttl_ms(ttl_secs)),
        };
        self.blocked.insert(ip.to_string(), entry.clone());
        entry
    }

    /// Remove a block and forget the IP's suspicion count.
    pub fn unblock(&self, ip: &str) -> bool {
        self.suspicion.remove(ip);
        self.blocked.remove(ip).is_some()
    }

    /// Count one suspicious hit for `ip`, escalating to a block at `threshold`.
    pub fn record_suspicious(&self, ip: &str, threshold: u32, ttl_secs: u64) -> Escalation {
        let reached = match self.suspicion.entry(ip.to_string()) {
            Entry::Occupied(mut occupied) => {
                let count = occupied.get_mut();
                *count += 1;
                if *count >= threshold {
                    occupied.remove();
                    None
                } else {
                    Some(*count)
                }
            }
            Entry::Vacant(vacant) => {
                if threshold <= 1 {
                    None
                } else {
                    vacant.insert(1);
                    Some(1)
                }
            }
        };

        match reached {
            Some(count) => Escalation::Counted(count),
            None => {
                self.block(ip, ttl_secs);
                Escalation::Blocked
            }
        }
    }

    /// Current suspicion count for `ip`.
    pub fn suspicion_count(&self, ip: &str) -> u32 {
        self.suspicion.get(ip).map(|c| *c).unwrap_or(0)
    }

    /// Unexpired blocks, oldest first.
    pub fn blocked_ips(&self) -> Vec<BlockedIp> {
        let now = self.clock.now_ms();
        let mut list: Vec<_> = self
            .blocked
            .iter()
            .filter(|b| b.expires_at > now)
            .map(|b| b.value().clone())
            .collect();
        list.sort_by(|a, b| a.blocked_at.cmp(&b.blocked_at).then_with(|| a.ip.cmp(&b.ip)));
        list
    }

    pub fn suspicious_activity(&self) -> Vec<SuspicionCounter> {
        let mut list: Vec<_> = self
            .suspicion
            .iter()
            .map(|r| SuspicionCounter {
                ip: r.key().clone(),
                count: *r.value(),
            })
            .collect();
        list.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));
        list
    }

    /// Hourly maintenance: forget all suspicion and drop expired blocks.
    /// Returns the number of blocks removed.
    pub fn housekeeping(&self) -> usize {
        self.suspicion.clear();
        let now = self.clock.now_ms();
        let before = self.blocked.len();
        self.blocked.retain(|_, b| b.expires_at > now);
        before.saturating_sub(self.blocked.len())
    }

    pub fn blocked_count(&self) -> usize {
        let now = self.clock.now_ms();
        self.blocked.iter().filter(|b| b.expires_at > now).count()
    }

    pub fn suspicious_count(&self) -> usize {
        self.suspicion.len()
    }
}
