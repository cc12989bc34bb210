//! Process memory sampling.
//!
//! Reads happen off the request path: [`ProcessMemory`] serves a cached
//! figure that the maintenance task refreshes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Reports current memory use in megabytes.
pub trait MemoryProbe: Send + Sync + std::fmt::Debug {
    fn used_mb(&self) -> f64;

    /// Take a fresh sample. Probes without a cache ignore this.
    fn refresh(&self) {}
}

/// Resident set size of the current process, cached between refreshes.
///
/// Uses `/proc/self/status` where available and reports 0 elsewhere.
#[derive(Debug)]
pub struct ProcessMemory {
    cached_bits: AtomicU64,
}

impl ProcessMemory {
    /// Probe primed with one sample.
    pub fn new() -> Self {
        Self {
            cached_bits: AtomicU64::new(read_rss_mb().to_bits()),
        }
    }
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemory {
    fn used_mb(&self) -> f64 {
        f64::from_bits(self.cached_bits.load(Ordering::Relaxed))
    }

    fn refresh(&self) {
        self.cached_bits.store(read_rss_mb().to_bits(), Ordering::Relaxed);
    }
}

fn read_rss_mb() -> f64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| parse_vm_rss_kb(&status))
        .map(|kb| kb as f64 / 1024.0)
        .unwrap_or(0.0)
}

fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}

/// A probe that always reports the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub f64);

impl MemoryProbe for FixedMemory {
    fn used_mb(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tgate\nVmPeak:\t  9000 kB\nVmRSS:\t  2048 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss_kb(status), Some(2048));
        assert_eq!(parse_vm_rss_kb("Name:\tgate\n"), None);
    }

    #[test]
    fn test_process_memory_serves_cached_sample() {
        let probe = ProcessMemory::new();
        probe.cached_bits.store(12.5_f64.to_bits(), Ordering::Relaxed);
        assert_eq!(probe.used_mb(), 12.5);
        assert_eq!(probe.used_mb(), 12.5);

        probe.refresh();
        assert!(probe.used_mb() >= 0.0);
    }
}
