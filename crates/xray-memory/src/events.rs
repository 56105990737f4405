use crate::size::bytes_to_mb;
use std::fmt;

/// Status events emitted to a [`MemoryObserver`](crate::MemoryObserver).
///
/// The `Display` form is the exact line handed to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryEvent {
    LimitApplied { ceiling_bytes: u64 },
    CollectionTargetApplied { percent: i32 },
    Usage { allocated_bytes: u64, limit_bytes: u64 },
    LimitExceeded,
    Healed { allocated_bytes: u64 },
    Critical { allocated_bytes: u64 },
}

impl fmt::Display for MemoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MemoryEvent::LimitApplied { ceiling_bytes } => {
                write!(f, "Memory limit enforced: {} MB", bytes_to_mb(ceiling_bytes))
            }
            MemoryEvent::CollectionTargetApplied { percent } => {
                write!(f, "Aggressive GC enabled: {percent}%")
            }
            MemoryEvent::Usage {
                allocated_bytes,
                limit_bytes,
            } => write!(
                f,
                "Memory usage: {} MB of {} MB",
                bytes_to_mb(allocated_bytes),
                bytes_to_mb(limit_bytes)
            ),
            MemoryEvent::LimitExceeded => {
                f.write_str("WARNING: memory limit exceeded! Forcing reclamation...")
            }
            MemoryEvent::Healed { allocated_bytes } => write!(
                f,
                "Memory reclaimed. Current usage: {} MB",
                bytes_to_mb(allocated_bytes)
            ),
            MemoryEvent::Critical { allocated_bytes } => write!(
                f,
                "CRITICAL: could not free enough memory! Current usage: {} MB",
                bytes_to_mb(allocated_bytes)
            ),
        }
    }
}

/// Verdict of a single [`MemoryGovernor::check_and_heal`](crate::MemoryGovernor::check_and_heal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealOutcome {
    /// No breach; nothing was reclaimed.
    WithinLimit { allocated_bytes: u64 },
    /// A breach was fixed by one reclamation pass.
    Healed { before_bytes: u64, after_bytes: u64 },
    /// A breach survived one reclamation pass. The next check tries again.
    Critical { before_bytes: u64, after_bytes: u64 },
}

impl HealOutcome {
    pub fn breached(&self) -> bool {
        !matches!(self, HealOutcome::WithinLimit { .. })
    }
}
