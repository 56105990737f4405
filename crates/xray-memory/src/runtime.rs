use crate::alloc::TrackingAllocator;
use crate::collect::{Collectable, CollectionRequest};
use crate::policy::RELAXED_COLLECTION_PERCENT;
use crate::process;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Raw counters reported by a [`MemoryRuntime`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeCounters {
    pub allocated_bytes: u64,
    pub total_allocated_bytes: u64,
    pub system_bytes: u64,
    pub collection_cycles: u64,
}

/// The memory-managing runtime the governor drives.
///
/// Configuration writes are absolute and last-writer-wins; implementations
/// must be safe to call from any thread without an external lock.
pub trait MemoryRuntime: Send + Sync {
    fn counters(&self) -> RuntimeCounters;

    fn set_memory_limit(&self, bytes: u64);

    fn memory_limit(&self) -> u64;

    fn set_collection_target(&self, percent: i32);

    fn collection_target(&self) -> i32;

    /// Run one blocking collection cycle.
    fn collect(&self);

    /// Return free pages to the OS. `false` when the platform has no way to
    /// do so.
    fn release_free_pages(&self) -> bool;
}

struct RegistrationEntry {
    name: String,
    usage_bytes: Arc<AtomicU64>,
    collectable: Arc<dyn Collectable>,
}

#[derive(Default)]
struct RssAccumulator {
    last_rss: u64,
    total: u64,
}

struct Inner {
    memory_limit: AtomicU64,
    collection_target: AtomicI32,
    cycles: AtomicU64,
    rss_total: Mutex<RssAccumulator>,
    next_id: AtomicU64,
    registrations: Mutex<HashMap<u64, RegistrationEntry>>,
}

/// [`MemoryRuntime`] for the current process.
///
/// Heap figures come from [`TrackingAllocator`] when it is installed and from
/// the resident set otherwise. Collection asks registered [`Collectable`]s to
/// shrink towards `memory_limit * collection_target / 100`.
#[derive(Clone)]
pub struct ProcessRuntime {
    inner: Arc<Inner>,
}

impl ProcessRuntime {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                memory_limit: AtomicU64::new(u64::MAX),
                collection_target: AtomicI32::new(RELAXED_COLLECTION_PERCENT),
                cycles: AtomicU64::new(0),
                rss_total: Mutex::new(RssAccumulator::default()),
                next_id: AtomicU64::new(1),
                registrations: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a cache that participates in collection cycles.
    ///
    /// The returned registration must be kept alive; dropping it removes the
    /// cache from future cycles.
    pub fn register_collectable(
        &self,
        name: impl Into<String>,
        collectable: Arc<dyn Collectable>,
    ) -> CollectableRegistration {
        let name = name.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let usage_bytes = Arc::new(AtomicU64::new(0));

        self.inner.registrations.lock().insert(
            id,
            RegistrationEntry {
                name: name.clone(),
                usage_bytes: usage_bytes.clone(),
                collectable,
            },
        );

        CollectableRegistration {
            id,
            name,
            usage_bytes,
            runtime: Arc::downgrade(&self.inner),
        }
    }

    /// Sum of the usage reported by registered collectables.
    pub fn tracked_bytes(&self) -> u64 {
        self.inner
            .registrations
            .lock()
            .values()
            .map(|entry| entry.usage_bytes.load(Ordering::Relaxed))
            .fold(0u64, u64::saturating_add)
    }

    fn rss_fallback(&self, rss: u64) -> (u64, u64) {
        let mut acc = self.inner.rss_total.lock();
        // Only growth counts towards the cumulative figure so it never decreases.
        let grown = rss.saturating_sub(acc.last_rss);
        acc.total = acc.total.saturating_add(grown);
        acc.last_rss = rss;
        (rss, acc.total)
    }

    fn collection_goal(&self) -> Option<u64> {
        let target = self.collection_target();
        if target < 0 {
            return None;
        }
        let limit = self.memory_limit();
        let goal = (limit as u128) * (target as u128) / 100;
        Some(goal.min(limit as u128) as u64)
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRuntime for ProcessRuntime {
    fn counters(&self) -> RuntimeCounters {
        let rss = process::current_rss_bytes();
        let (allocated_bytes, total_allocated_bytes) = match TrackingAllocator::counters() {
            Some(counters) => (counters.live_bytes, counters.total_bytes),
            None => self.rss_fallback(rss.unwrap_or(0)),
        };

        RuntimeCounters {
            allocated_bytes,
            total_allocated_bytes,
            system_bytes: rss.unwrap_or(allocated_bytes),
            collection_cycles: self.inner.cycles.load(Ordering::Relaxed),
        }
    }

    fn set_memory_limit(&self, bytes: u64) {
        self.inner.memory_limit.store(bytes, Ordering::Relaxed);
    }

    fn memory_limit(&self) -> u64 {
        self.inner.memory_limit.load(Ordering::Relaxed)
    }

    fn set_collection_target(&self, percent: i32) {
        self.inner
            .collection_target
            .store(percent, Ordering::Relaxed);
    }

    fn collection_target(&self) -> i32 {
        self.inner.collection_target.load(Ordering::Relaxed)
    }

    fn collect(&self) {
        // Snapshot registrations so no lock is held while calling into caches.
        let entries: Vec<(String, Arc<AtomicU64>, Arc<dyn Collectable>)> = {
            let registrations = self.inner.registrations.lock();
            registrations
                .values()
                .map(|entry| {
                    (
                        entry.name.clone(),
                        entry.usage_bytes.clone(),
                        entry.collectable.clone(),
                    )
                })
                .collect()
        };

        match self.collection_goal() {
            None => {
                tracing::debug!(
                    target: "xray.memory",
                    "collection target is negative; skipping collectables"
                );
            }
            Some(goal) => {
                let tracked: u64 = entries
                    .iter()
                    .map(|(_, usage, _)| usage.load(Ordering::Relaxed))
                    .fold(0u64, u64::saturating_add);

                if tracked > goal {
                    let ceiling_bytes = self.memory_limit();
                    let mut freed = 0u64;
                    for (name, usage, collectable) in &entries {
                        let component_usage = usage.load(Ordering::Relaxed);
                        // Proportional share of the goal.
                        let target_bytes = ((component_usage as u128) * (goal as u128)
                            / (tracked.max(1) as u128)) as u64;
                        let result = collectable.collect(CollectionRequest {
                            target_bytes,
                            ceiling_bytes,
                        });
                        usage.store(result.after_bytes, Ordering::Relaxed);
                        freed = freed.saturating_add(result.freed_bytes());
                        tracing::trace!(
                            target: "xray.memory",
                            collectable = %name,
                            before = result.before_bytes,
                            after = result.after_bytes,
                            "collectable shrunk"
                        );
                    }
                    tracing::debug!(
                        target: "xray.memory",
                        goal,
                        tracked,
                        freed,
                        "collection cycle released tracked memory"
                    );
                }
            }
        }

        self.inner.cycles.fetch_add(1, Ordering::Relaxed);
    }

    fn release_free_pages(&self) -> bool {
        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        {
            // SAFETY: `malloc_trim` has no preconditions; a zero pad trims as
            // much as glibc can.
            let released = unsafe { libc::malloc_trim(0) };
            tracing::trace!(target: "xray.memory", released, "malloc_trim finished");
            true
        }

        #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
        {
            false
        }
    }
}

/// Handle kept by the registering cache; dropping it unregisters the cache.
pub struct CollectableRegistration {
    id: u64,
    name: String,
    usage_bytes: Arc<AtomicU64>,
    runtime: Weak<Inner>,
}

impl CollectableRegistration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tracker(&self) -> CollectableTracker {
        CollectableTracker {
            usage_bytes: self.usage_bytes.clone(),
        }
    }
}

impl std::fmt::Debug for CollectableRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectableRegistration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("usage_bytes", &self.usage_bytes.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for CollectableRegistration {
    fn drop(&mut self) {
        self.usage_bytes.store(0, Ordering::Relaxed);
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.registrations.lock().remove(&self.id);
        }
    }
}

/// Usage reporting handle for a registered collectable.
#[derive(Clone)]
pub struct CollectableTracker {
    usage_bytes: Arc<AtomicU64>,
}

impl CollectableTracker {
    pub fn set_bytes(&self, bytes: u64) {
        self.usage_bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.usage_bytes.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CollectableTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectableTracker")
            .field("bytes", &self.bytes())
            .finish()
    }
}
