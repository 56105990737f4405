use crate::size::MB;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on live heap bytes. No caller may configure a larger ceiling.
pub const HARD_CEILING_BYTES: u64 = 50 * MB;

/// Collection target installed by [`MemoryGovernor::assert_policy`](crate::MemoryGovernor::assert_policy).
pub const AGGRESSIVE_COLLECTION_PERCENT: i32 = 20;

/// Collection target installed by [`MemoryGovernor::relax_policy`](crate::MemoryGovernor::relax_policy).
pub const RELAXED_COLLECTION_PERCENT: i32 = 100;

/// Default period of the background memory monitor.
pub const MEMORY_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// The policy currently in effect on a [`MemoryRuntime`](crate::MemoryRuntime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPolicy {
    /// Byte ceiling configured on the runtime; always `<= HARD_CEILING_BYTES`
    /// when written through the governor.
    pub ceiling_bytes: u64,
    /// Collection aggressiveness; lower values collect more eagerly.
    pub collection_target_percent: i32,
}

impl MemoryPolicy {
    pub fn aggressive() -> Self {
        Self {
            ceiling_bytes: HARD_CEILING_BYTES,
            collection_target_percent: AGGRESSIVE_COLLECTION_PERCENT,
        }
    }

    pub fn relaxed() -> Self {
        Self {
            ceiling_bytes: HARD_CEILING_BYTES,
            collection_target_percent: RELAXED_COLLECTION_PERCENT,
        }
    }

    /// Clamp a requested ceiling to the hard ceiling. The collection target
    /// is passed through untouched.
    pub fn clamped(requested_ceiling_bytes: u64, collection_target_percent: i32) -> Self {
        Self {
            ceiling_bytes: requested_ceiling_bytes.min(HARD_CEILING_BYTES),
            collection_target_percent,
        }
    }
}
