use std::sync::Arc;

use crate::errors::{DomainError, DomainResult};

/// Reads current process memory usage. Swappable so tests can simulate
/// pressure without allocating.
pub trait MemoryProbe: Send + Sync {
    /// Resident set size in bytes, or `None` when it cannot be read on this
    /// platform.
    fn rss_bytes(&self) -> Option<u64>;
}

/// Linux probe reading `VmRSS` from `/proc/self/status`. Returns `None`
/// elsewhere, which disables the guard rather than failing extraction.
pub struct ProcMemoryProbe;

impl MemoryProbe for ProcMemoryProbe {
    fn rss_bytes(&self) -> Option<u64> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss(&status)
    }
}

/// Parse the `VmRSS:` line (value reported in kB).
fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Periodic memory guard for extraction loops.
///
/// Two-stage check against a percentage of the configured limit: above the
/// soft threshold the usage is re-measured once (the grace step — by the time
/// a loop notices pressure, freed buffers may already have been returned);
/// still above the hard threshold, the extraction is aborted. An absent limit
/// or an unreadable probe disables the guard.
#[derive(Clone)]
pub struct MemoryMonitor {
    probe: Arc<dyn MemoryProbe>,
    limit_bytes: Option<u64>,
    soft_percent: u8,
    hard_percent: u8,
}

impl MemoryMonitor {
    pub fn new(probe: Arc<dyn MemoryProbe>, limit_mb: Option<u64>, soft: u8, hard: u8) -> Self {
        Self {
            probe,
            limit_bytes: limit_mb.map(|mb| mb * 1024 * 1024),
            soft_percent: soft,
            hard_percent: hard,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(Arc::new(ProcMemoryProbe), None, 80, 95)
    }

    /// Percentage-based check with the re-measure grace step.
    pub fn check(&self) -> DomainResult<()> {
        let Some(limit) = self.limit_bytes else {
            return Ok(());
        };
        let Some(used) = self.probe.rss_bytes() else {
            return Ok(());
        };

        let soft = limit / 100 * self.soft_percent as u64;
        if used <= soft {
            return Ok(());
        }

        log::warn!(
            "memory usage {} MB above soft threshold ({} MB limit), re-measuring",
            used / (1024 * 1024),
            limit / (1024 * 1024)
        );

        let used = self.probe.rss_bytes().unwrap_or(used);
        let hard = limit / 100 * self.hard_percent as u64;
        if used > hard {
            return Err(DomainError::ResourceExhausted {
                used_mb: used / (1024 * 1024),
                limit_mb: limit / (1024 * 1024),
            });
        }
        Ok(())
    }

    /// Single absolute ceiling, no grace step. Used by the large-table
    /// fallback path where pressure means something is already wrong.
    pub fn check_absolute(&self, limit_mb: u64) -> DomainResult<()> {
        let Some(used) = self.probe.rss_bytes() else {
            return Ok(());
        };
        let limit = limit_mb * 1024 * 1024;
        if used > limit {
            return Err(DomainError::ResourceExhausted {
                used_mb: used / (1024 * 1024),
                limit_mb,
            });
        }
        Ok(())
    }
}
