use crate::events::{HealOutcome, MemoryEvent};
use crate::monitor::{self, MonitorConfig, MonitorHandle};
use crate::observer::{emit, MemoryObserver};
use crate::policy::{MemoryPolicy, HARD_CEILING_BYTES};
use crate::report;
use crate::runtime::{MemoryRuntime, ProcessRuntime};
use crate::size::bytes_to_mb;
use crate::stats::MemoryStats;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Coarse usage figures in whole mebibytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub current_mb: u64,
    pub limit_mb: u64,
    pub within_limit: bool,
}

/// Owns the process-wide memory policy and the breach/heal cycle.
///
/// Construct one governor at startup, before the proxy engine allocates, and
/// pass clones to whatever needs to query or adjust memory policy. Every
/// operation is synchronous and callable from any thread; only the monitor
/// started by [`MemoryGovernor::start_monitor`] runs in the background.
#[derive(Clone)]
pub struct MemoryGovernor {
    runtime: Arc<dyn MemoryRuntime>,
}

impl MemoryGovernor {
    /// Wraps `runtime` and installs the aggressive policy on it.
    pub fn new(runtime: Arc<dyn MemoryRuntime>) -> Self {
        let governor = Self { runtime };
        governor.apply(MemoryPolicy::aggressive());
        governor
    }

    /// Governor for the current process.
    pub fn for_process(runtime: ProcessRuntime) -> Self {
        Self::new(Arc::new(runtime))
    }

    pub fn hard_ceiling_bytes(&self) -> u64 {
        HARD_CEILING_BYTES
    }

    pub fn runtime(&self) -> &Arc<dyn MemoryRuntime> {
        &self.runtime
    }

    /// The policy currently configured on the runtime.
    pub fn policy(&self) -> MemoryPolicy {
        MemoryPolicy {
            ceiling_bytes: self.runtime.memory_limit(),
            collection_target_percent: self.runtime.collection_target(),
        }
    }

    fn apply(&self, policy: MemoryPolicy) {
        self.runtime.set_memory_limit(policy.ceiling_bytes);
        self.runtime
            .set_collection_target(policy.collection_target_percent);
        tracing::debug!(
            target: "xray.memory",
            ceiling_bytes = policy.ceiling_bytes,
            collection_target_percent = policy.collection_target_percent,
            "memory policy applied"
        );
    }

    /// Re-applies the hard ceiling and aggressive collection target without
    /// checking usage.
    pub fn pin_policy(&self) {
        self.apply(MemoryPolicy::aggressive());
    }

    /// Installs the hard ceiling and aggressive collection target, reports
    /// both, then runs one breach check so a process that starts over budget
    /// corrects itself immediately.
    pub fn assert_policy(&self, observer: Option<&dyn MemoryObserver>) -> HealOutcome {
        let policy = MemoryPolicy::aggressive();
        self.apply(policy);
        emit(
            observer,
            &MemoryEvent::LimitApplied {
                ceiling_bytes: policy.ceiling_bytes,
            }
            .to_string(),
        );
        emit(
            observer,
            &MemoryEvent::CollectionTargetApplied {
                percent: policy.collection_target_percent,
            }
            .to_string(),
        );
        self.check_and_heal(observer)
    }

    /// Applies a caller-requested policy. The ceiling is clamped to the hard
    /// ceiling; the collection target is applied as given.
    pub fn set_policy(&self, requested_ceiling_bytes: u64, collection_target_percent: i32) {
        let policy = MemoryPolicy::clamped(requested_ceiling_bytes, collection_target_percent);
        if policy.ceiling_bytes < requested_ceiling_bytes {
            tracing::debug!(
                target: "xray.memory",
                requested_ceiling_bytes,
                ceiling_bytes = policy.ceiling_bytes,
                "requested memory ceiling clamped to hard ceiling"
            );
        }
        self.apply(policy);
    }

    /// "Removes" limiting: relaxes the collection target to 100% but keeps
    /// the hard ceiling pinned. The ceiling cannot be lifted.
    pub fn relax_policy(&self) {
        self.apply(MemoryPolicy::relaxed());
    }

    pub fn sample(&self) -> MemoryStats {
        MemoryStats::from_counters(self.runtime.counters(), HARD_CEILING_BYTES)
    }

    pub fn usage(&self) -> MemoryUsage {
        let stats = self.sample();
        MemoryUsage {
            current_mb: stats.allocated_mb(),
            limit_mb: stats.limit_mb(),
            within_limit: stats.within_limit,
        }
    }

    /// Blocking collection followed by a best-effort return of free pages to
    /// the OS.
    pub fn force_reclaim(&self) {
        self.runtime.collect();
        if !self.runtime.release_free_pages() {
            tracing::trace!(
                target: "xray.memory",
                "runtime cannot release free pages; collected only"
            );
        }
    }

    /// Samples usage and, on a breach, reclaims once and re-checks.
    ///
    /// The usage line is always reported. A breach adds a warning, one
    /// reclamation, the post-reclaim usage line and exactly one of the
    /// "healed" or "critical" lines. There is no retry within a call.
    pub fn check_and_heal(&self, observer: Option<&dyn MemoryObserver>) -> HealOutcome {
        let before = self.sample();
        emit(observer, &usage_event(&before).to_string());
        if before.within_limit {
            return HealOutcome::WithinLimit {
                allocated_bytes: before.allocated_bytes,
            };
        }

        tracing::warn!(
            target: "xray.memory",
            allocated_mb = before.allocated_mb(),
            limit_mb = before.limit_mb(),
            "memory limit exceeded; forcing reclamation"
        );
        emit(observer, &MemoryEvent::LimitExceeded.to_string());

        self.force_reclaim();

        let after = self.sample();
        emit(observer, &usage_event(&after).to_string());
        if after.within_limit {
            tracing::info!(
                target: "xray.memory",
                allocated_mb = after.allocated_mb(),
                "memory reclaimed below limit"
            );
            emit(
                observer,
                &MemoryEvent::Healed {
                    allocated_bytes: after.allocated_bytes,
                }
                .to_string(),
            );
            HealOutcome::Healed {
                before_bytes: before.allocated_bytes,
                after_bytes: after.allocated_bytes,
            }
        } else {
            tracing::error!(
                target: "xray.memory",
                allocated_mb = after.allocated_mb(),
                limit_mb = after.limit_mb(),
                "could not reclaim enough memory"
            );
            emit(
                observer,
                &MemoryEvent::Critical {
                    allocated_bytes: after.allocated_bytes,
                }
                .to_string(),
            );
            HealOutcome::Critical {
                before_bytes: before.allocated_bytes,
                after_bytes: after.allocated_bytes,
            }
        }
    }

    /// Samples and reports the full statistics block. Skips sampling when
    /// there is no observer.
    pub fn log_stats(&self, observer: Option<&dyn MemoryObserver>) {
        if observer.is_none() {
            return;
        }
        report::report(observer, &self.sample());
    }

    /// Starts the background monitor with the default 30 second interval.
    pub fn start_monitor(
        &self,
        handle: &tokio::runtime::Handle,
        observer: Option<Arc<dyn MemoryObserver>>,
    ) -> MonitorHandle {
        self.start_monitor_with(handle, MonitorConfig::default(), observer)
    }

    pub fn start_monitor_with(
        &self,
        handle: &tokio::runtime::Handle,
        config: MonitorConfig,
        observer: Option<Arc<dyn MemoryObserver>>,
    ) -> MonitorHandle {
        monitor::spawn(self.clone(), handle, config, observer)
    }
}

impl std::fmt::Debug for MemoryGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGovernor")
            .field("policy", &self.policy())
            .field("hard_ceiling_mb", &bytes_to_mb(HARD_CEILING_BYTES))
            .finish()
    }
}

fn usage_event(stats: &MemoryStats) -> MemoryEvent {
    MemoryEvent::Usage {
        allocated_bytes: stats.allocated_bytes,
        limit_bytes: stats.limit_bytes,
    }
}
