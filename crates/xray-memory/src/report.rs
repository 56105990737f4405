use crate::observer::{emit, MemoryObserver};
use crate::stats::MemoryStats;

/// Formats `stats` as the fixed block of labelled lines.
///
/// Downstream log consumers parse this block; field order and labels are
/// stable.
pub fn report_lines(stats: &MemoryStats) -> Vec<String> {
    vec![
        "=== MEMORY STATISTICS ===".to_owned(),
        format!("Allocated: {} MB", stats.allocated_mb()),
        format!("Total ever allocated: {} MB", stats.total_allocated_mb()),
        format!("System memory: {} MB", stats.system_mb()),
        format!("Limit: {} MB", stats.limit_mb()),
        format!("Within limit: {}", stats.within_limit),
        format!("GC cycle count: {}", stats.gc_cycle_count),
        "========================".to_owned(),
    ]
}

/// Forwards the statistics block to `observer`, one line per call.
pub fn report(observer: Option<&dyn MemoryObserver>, stats: &MemoryStats) {
    if observer.is_none() {
        return;
    }
    for line in report_lines(stats) {
        emit(observer, &line);
    }
}
