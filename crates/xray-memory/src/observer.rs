/// Line-oriented sink supplied by the host (usually its logger).
///
/// The governor only ever writes to an observer. Closures taking `&str` are
/// observers too.
pub trait MemoryObserver: Send + Sync {
    fn log_line(&self, line: &str);
}

impl<F> MemoryObserver for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log_line(&self, line: &str) {
        self(line)
    }
}

/// Forwards observer lines to `tracing` at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl MemoryObserver for TracingObserver {
    fn log_line(&self, line: &str) {
        tracing::info!(target: "xray.memory", "{line}");
    }
}

pub(crate) fn emit(observer: Option<&dyn MemoryObserver>, line: &str) {
    if let Some(observer) = observer {
        observer.log_line(line);
    }
}
