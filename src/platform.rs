/*!
 * Hardware classification for concurrency defaults.
 *
 * Detection (sysinfo) is kept separate from classification so the tier logic
 * stays a pure, testable function of a hardware snapshot.
 */

use sysinfo::System;

use crate::app_config::ConcurrencyLimit;

/// Coarse hardware class used to pick scheduler defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformTier {
    /// Many cores and plenty of memory
    Tier1,
    /// Mid-range desktop/laptop
    Tier2,
    /// Constrained hardware
    Tier3,
}

/// Snapshot of the facts the classifier depends on
#[derive(Debug, Clone, Copy)]
pub struct HardwareSnapshot {
    /// Logical CPU count
    pub cpu_cores: usize,
    /// Total system memory in gigabytes
    pub total_memory_gb: f64,
}

impl HardwareSnapshot {
    /// Probe the current machine
    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        let cpu_cores = system.cpus().len().max(1);
        let total_memory_gb = system.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);

        Self {
            cpu_cores,
            total_memory_gb,
        }
    }
}

/// Classify a hardware snapshot into a tier
pub fn classify(snapshot: HardwareSnapshot) -> PlatformTier {
    if snapshot.cpu_cores >= 8 && snapshot.total_memory_gb >= 15.0 {
        PlatformTier::Tier1
    } else if snapshot.cpu_cores >= 4 && snapshot.total_memory_gb >= 7.0 {
        PlatformTier::Tier2
    } else {
        PlatformTier::Tier3
    }
}

/// Default worker-process ceiling for a tier
pub fn default_ceiling(tier: PlatformTier) -> usize {
    match tier {
        PlatformTier::Tier1 => 4,
        PlatformTier::Tier2 => 2,
        PlatformTier::Tier3 => 1,
    }
}

/// Resolve the configured limit against the detected hardware
pub fn resolve_ceiling(limit: ConcurrencyLimit, tier: PlatformTier) -> usize {
    match limit {
        ConcurrencyLimit::Auto => default_ceiling(tier),
        ConcurrencyLimit::Fixed(n) => n.max(1),
    }
}
