//! Memory governance for the xray proxy host.
//!
//! The proxy engine's own allocations are opaque to the host, so this crate
//! bounds them from the outside:
//! - A hard ceiling (50 MiB) is pinned on the [`MemoryRuntime`] and can never
//!   be raised by callers; requests above it are clamped.
//! - Statistics are sampled on demand ([`MemoryGovernor::sample`]) and on a
//!   fixed interval by a cancellable background [`MonitorHandle`].
//! - Breaches trigger exactly one synchronous reclamation pass followed by a
//!   "healed" or "critical" verdict reported to a line-oriented
//!   [`MemoryObserver`].
//!
//! Rust has no garbage collector; [`ProcessRuntime`] models "collection" as a
//! cooperative shrink request to registered [`Collectable`] caches plus a
//! best-effort return of free allocator pages to the OS.

mod alloc;
mod collect;
mod events;
mod governor;
mod monitor;
mod observer;
mod policy;
mod process;
mod report;
mod runtime;
mod size;
mod stats;

pub use alloc::{AllocatorCounters, TrackingAllocator};
pub use collect::{Collectable, CollectionRequest, CollectionResult};
pub use events::{HealOutcome, MemoryEvent};
pub use governor::{MemoryGovernor, MemoryUsage};
pub use monitor::{MonitorConfig, MonitorHandle};
pub use observer::{MemoryObserver, TracingObserver};
pub use policy::{
    MemoryPolicy, AGGRESSIVE_COLLECTION_PERCENT, HARD_CEILING_BYTES, MEMORY_CHECK_INTERVAL,
    RELAXED_COLLECTION_PERCENT,
};
pub use process::current_rss_bytes;
pub use report::{report, report_lines};
pub use runtime::{
    CollectableRegistration, CollectableTracker, MemoryRuntime, ProcessRuntime, RuntimeCounters,
};
pub use size::{bytes_to_mb, parse_byte_size, ByteSizeError, GB, KB, MB};
pub use stats::MemoryStats;
