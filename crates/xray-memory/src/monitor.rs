use crate::governor::MemoryGovernor;
use crate::observer::MemoryObserver;
use crate::policy::MEMORY_CHECK_INTERVAL;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Time between checks. The first check runs one interval after start.
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: MEMORY_CHECK_INTERVAL,
        }
    }
}

/// Handle to a running background memory monitor.
///
/// The monitor is running from the moment the handle is returned and stops
/// for good once [`MonitorHandle::stop`] is called or the handle is dropped.
/// Start a new monitor to resume checking.
pub struct MonitorHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Requests the monitor to stop. Takes effect immediately when idle, or
    /// after the in-flight check finishes.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for the background task to exit. Does not request a stop.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::debug!(
                    target: "xray.memory",
                    error = %err,
                    "memory monitor task ended abnormally"
                );
            }
        }
    }

    pub async fn stop_and_join(self) {
        self.stop();
        self.join().await;
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

pub(crate) fn spawn(
    governor: MemoryGovernor,
    handle: &tokio::runtime::Handle,
    config: MonitorConfig,
    observer: Option<Arc<dyn MemoryObserver>>,
) -> MonitorHandle {
    let token = CancellationToken::new();
    let task_token = token.clone();
    let period = config.interval.max(MIN_INTERVAL);

    let task = handle.spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        // A slow check delays the next tick instead of queueing a burst.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(
            target: "xray.memory",
            interval_ms = period.as_millis() as u64,
            "memory monitor started"
        );

        loop {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // The check blocks during reclamation; run it off the async
            // workers and wait for it before arming the next tick.
            let governor = governor.clone();
            let observer = observer.clone();
            let check = tokio::task::spawn_blocking(move || {
                governor.check_and_heal(observer.as_deref())
            });
            match check.await {
                Ok(outcome) => {
                    tracing::trace!(target: "xray.memory", ?outcome, "memory check finished");
                }
                Err(err) => {
                    tracing::debug!(
                        target: "xray.memory",
                        error = %err,
                        "memory check panicked"
                    );
                }
            }
        }

        tracing::debug!(target: "xray.memory", "memory monitor stopped");
    });

    MonitorHandle {
        token,
        task: Some(task),
    }
}
