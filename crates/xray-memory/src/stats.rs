use crate::runtime::RuntimeCounters;
use crate::size::bytes_to_mb;
use serde::{Deserialize, Serialize};

/// Point-in-time memory statistics. All sizes are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Live heap bytes.
    pub allocated_bytes: u64,
    /// Cumulative heap bytes allocated since process start.
    pub total_allocated_bytes: u64,
    /// Bytes obtained from the operating system.
    pub system_bytes: u64,
    /// The hard ceiling the sample was judged against.
    pub limit_bytes: u64,
    pub within_limit: bool,
    pub gc_cycle_count: u64,
}

impl MemoryStats {
    pub fn from_counters(counters: RuntimeCounters, limit_bytes: u64) -> Self {
        Self {
            allocated_bytes: counters.allocated_bytes,
            total_allocated_bytes: counters.total_allocated_bytes,
            system_bytes: counters.system_bytes,
            limit_bytes,
            within_limit: counters.allocated_bytes <= limit_bytes,
            gc_cycle_count: counters.collection_cycles,
        }
    }

    pub fn allocated_mb(&self) -> u64 {
        bytes_to_mb(self.allocated_bytes)
    }

    pub fn total_allocated_mb(&self) -> u64 {
        bytes_to_mb(self.total_allocated_bytes)
    }

    pub fn system_mb(&self) -> u64 {
        bytes_to_mb(self.system_bytes)
    }

    pub fn limit_mb(&self) -> u64 {
        bytes_to_mb(self.limit_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size::MB;

    #[test]
    fn within_limit_is_inclusive() {
        let at_limit = RuntimeCounters {
            allocated_bytes: 50 * MB,
            ..RuntimeCounters::default()
        };
        assert!(MemoryStats::from_counters(at_limit, 50 * MB).within_limit);

        let over = RuntimeCounters {
            allocated_bytes: 50 * MB + 1,
            ..RuntimeCounters::default()
        };
        let stats = MemoryStats::from_counters(over, 50 * MB);
        assert!(!stats.within_limit);
        assert_eq!(stats.allocated_mb(), 50);
    }

    #[test]
    fn serializes_with_byte_fields() {
        let stats = MemoryStats::from_counters(
            RuntimeCounters {
                allocated_bytes: 1,
                total_allocated_bytes: 2,
                system_bytes: 3,
                collection_cycles: 4,
            },
            5,
        );
        let value = serde_json::to_value(stats).unwrap();
        assert_eq!(value["allocated_bytes"], 1);
        assert_eq!(value["gc_cycle_count"], 4);
        assert_eq!(value["within_limit"], true);
    }
}
