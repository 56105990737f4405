//! Runs a proxy engine under a [`MemoryGovernor`].
//!
//! The engine itself (config decoding, instance lifecycle, dialing) lives
//! behind [`ProxyEngine`]; this crate only sequences governor calls around
//! the engine's start, stop and latency probes.

mod env;

pub use env::{set_assets_directory, set_engine_env, ASSET_LOCATION_ENV};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use xray_memory::{MemoryGovernor, MemoryObserver, MemoryUsage};

/// Probe target used when the caller passes an empty URL.
pub const DEFAULT_PROBE_URL: &str = "https://www.google.com/generate_204";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine config: {0}")]
    Config(String),
    #[error("engine failed: {0}")]
    Engine(String),
    #[error("probe failed: {0}")]
    Probe(String),
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("engine is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// The hosted proxy engine.
pub trait ProxyEngine: Send + Sync {
    /// Build and start an instance from a serialized engine config.
    fn start(&self, config: &[u8]) -> Result<(), EngineError>;

    fn stop(&self);

    /// Build a throwaway outbound-only instance from `config` and time one
    /// request to `url` through it.
    fn probe(&self, config: &[u8], url: &str) -> Result<Duration, EngineError>;
}

pub struct EngineHost<E> {
    engine: E,
    governor: MemoryGovernor,
    running: AtomicBool,
}

impl<E: ProxyEngine> EngineHost<E> {
    pub fn new(engine: E, governor: MemoryGovernor) -> Self {
        Self {
            engine,
            governor,
            running: AtomicBool::new(false),
        }
    }

    pub fn governor(&self) -> &MemoryGovernor {
        &self.governor
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn usage(&self) -> MemoryUsage {
        self.governor.usage()
    }

    /// Pins the memory policy, reports statistics, starts the engine and
    /// checks memory again once it is up.
    pub fn start(
        &self,
        config: &[u8],
        observer: Option<&dyn MemoryObserver>,
    ) -> Result<(), HostError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(HostError::AlreadyRunning);
        }

        self.governor.assert_policy(observer);
        self.governor.log_stats(observer);

        if let Err(err) = self.engine.start(config) {
            self.running.store(false, Ordering::SeqCst);
            if let Some(observer) = observer {
                observer.log_line(&format!("Start error: {err}"));
            }
            tracing::error!(target: "xray.host", error = %err, "failed to start engine");
            return Err(err.into());
        }
        tracing::info!(target: "xray.host", "engine started");

        self.governor.check_and_heal(observer);
        Ok(())
    }

    /// Stops the engine. Does nothing if it is not running.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.engine.stop();
            tracing::info!(target: "xray.host", "engine stopped");
        }
    }

    /// Measures outbound round-trip latency in milliseconds.
    ///
    /// The probe instance runs under the hard ceiling and is always followed
    /// by a forced reclamation, whether the probe succeeded or not.
    pub fn measure_outbound_delay(&self, config: &[u8], url: &str) -> Result<u64, HostError> {
        self.governor.pin_policy();

        let url = if url.is_empty() { DEFAULT_PROBE_URL } else { url };
        let result = self.engine.probe(config, url);
        self.governor.force_reclaim();

        let elapsed = result.map_err(|err| {
            tracing::debug!(target: "xray.host", url, error = %err, "outbound probe failed");
            err
        })?;
        Ok(elapsed.as_millis() as u64)
    }
}
