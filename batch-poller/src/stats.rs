//! Runtime counters for a poller

use std::time::Duration;

use crate::scheduler::Phase;

/// Point-in-time statistics of a BatchPoller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerStats {
    pub name: String,
    pub phase: Phase,
    pub listeners: usize,
    pub current_delay: Duration,
    pub fetch_count: u64,
    pub fetch_failures: u64,
    pub resolved_count: u64,
    pub collision_count: u64,
}

impl std::fmt::Display for PollerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Batch Poller Stats ({}):", self.name)?;
        writeln!(f, "  Phase: {:?}", self.phase)?;
        writeln!(f, "  Listeners: {}", self.listeners)?;
        writeln!(f, "  Current delay: {:?}", self.current_delay)?;
        writeln!(
            f,
            "  Fetches: {} ({} failed)",
            self.fetch_count, self.fetch_failures
        )?;
        writeln!(
            f,
            "  Resolved: {}, collisions: {}",
            self.resolved_count, self.collision_count
        )?;

        Ok(())
    }
}
