use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

static LIVE_BYTES: AtomicU64 = AtomicU64::new(0);
static TOTAL_BYTES: AtomicU64 = AtomicU64::new(0);

/// Heap counters maintained by [`TrackingAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorCounters {
    /// Bytes currently allocated and not yet freed.
    pub live_bytes: u64,
    /// Bytes allocated since process start (never decreases).
    pub total_bytes: u64,
}

/// A [`System`]-backed global allocator that counts live and cumulative heap
/// bytes.
///
/// Install it in the host binary so [`ProcessRuntime`](crate::ProcessRuntime)
/// reports real heap figures instead of falling back to the resident set:
///
/// ```ignore
/// #[global_allocator]
/// static ALLOC: xray_memory::TrackingAllocator = xray_memory::TrackingAllocator;
/// ```
pub struct TrackingAllocator;

impl TrackingAllocator {
    /// Current counters, or `None` when the tracking allocator is not the
    /// process's global allocator.
    pub fn counters() -> Option<AllocatorCounters> {
        let total_bytes = TOTAL_BYTES.load(Ordering::Relaxed);
        if total_bytes == 0 {
            return None;
        }
        Some(AllocatorCounters {
            live_bytes: LIVE_BYTES.load(Ordering::Relaxed),
            total_bytes,
        })
    }
}

fn record_alloc(size: usize) {
    LIVE_BYTES.fetch_add(size as u64, Ordering::Relaxed);
    TOTAL_BYTES.fetch_add(size as u64, Ordering::Relaxed);
}

fn record_dealloc(size: usize) {
    LIVE_BYTES.fetch_sub(size as u64, Ordering::Relaxed);
}

// SAFETY: every call is forwarded unchanged to `System`; the wrapper only
// updates atomic counters and never allocates itself.
unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        record_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            let old_size = layout.size();
            if new_size >= old_size {
                record_alloc(new_size - old_size);
            } else {
                record_dealloc(old_size - new_size);
            }
        }
        new_ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_follow_direct_allocator_calls() {
        let before_total = TOTAL_BYTES.load(Ordering::Relaxed);
        let layout = Layout::from_size_align(4096, 8).unwrap();

        unsafe {
            let ptr = TrackingAllocator.alloc(layout);
            assert!(!ptr.is_null());
            let ptr = TrackingAllocator.realloc(ptr, layout, 8192);
            assert!(!ptr.is_null());
            TrackingAllocator.dealloc(ptr, Layout::from_size_align(8192, 8).unwrap());
        }

        let counters = TrackingAllocator::counters().expect("counters recorded");
        assert!(counters.total_bytes >= before_total + 8192);
    }
}
