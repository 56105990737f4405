use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use xray_host::{
    set_assets_directory, set_engine_env, EngineError, EngineHost, HostError, ProxyEngine,
    ASSET_LOCATION_ENV, DEFAULT_PROBE_URL,
};
use xray_memory::{
    MemoryGovernor, MemoryRuntime, RuntimeCounters, AGGRESSIVE_COLLECTION_PERCENT,
    HARD_CEILING_BYTES, MB,
};

struct FixedRuntime {
    allocated: AtomicU64,
    limit: AtomicU64,
    target: AtomicI32,
    collections: AtomicU64,
}

impl FixedRuntime {
    fn new(allocated: u64) -> Arc<Self> {
        Arc::new(Self {
            allocated: AtomicU64::new(allocated),
            limit: AtomicU64::new(u64::MAX),
            target: AtomicI32::new(100),
            collections: AtomicU64::new(0),
        })
    }
}

impl MemoryRuntime for FixedRuntime {
    fn counters(&self) -> RuntimeCounters {
        let allocated = self.allocated.load(Ordering::SeqCst);
        RuntimeCounters {
            allocated_bytes: allocated,
            total_allocated_bytes: allocated,
            system_bytes: allocated,
            collection_cycles: self.collections.load(Ordering::SeqCst),
        }
    }

    fn set_memory_limit(&self, bytes: u64) {
        self.limit.store(bytes, Ordering::SeqCst);
    }

    fn memory_limit(&self) -> u64 {
        self.limit.load(Ordering::SeqCst)
    }

    fn set_collection_target(&self, percent: i32) {
        self.target.store(percent, Ordering::SeqCst);
    }

    fn collection_target(&self) -> i32 {
        self.target.load(Ordering::SeqCst)
    }

    fn collect(&self) {
        self.collections.fetch_add(1, Ordering::SeqCst);
    }

    fn release_free_pages(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct FakeEngine {
    calls: Mutex<Vec<String>>,
    fail_start: bool,
    fail_probe: bool,
}

impl FakeEngine {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProxyEngine for FakeEngine {
    fn start(&self, config: &[u8]) -> Result<(), EngineError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("start:{}", String::from_utf8_lossy(config)));
        if self.fail_start {
            return Err(EngineError::Config("unexpected token".to_owned()));
        }
        Ok(())
    }

    fn stop(&self) {
        self.calls.lock().unwrap().push("stop".to_owned());
    }

    fn probe(&self, _config: &[u8], url: &str) -> Result<Duration, EngineError> {
        self.calls.lock().unwrap().push(format!("probe:{url}"));
        if self.fail_probe {
            return Err(EngineError::Probe("connection reset".to_owned()));
        }
        Ok(Duration::from_millis(42))
    }
}

#[derive(Default)]
struct Lines(Mutex<Vec<String>>);

impl xray_memory::MemoryObserver for Lines {
    fn log_line(&self, line: &str) {
        self.0.lock().unwrap().push(line.to_owned());
    }
}

impl Lines {
    fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

fn host(engine: FakeEngine, allocated: u64) -> (EngineHost<FakeEngine>, Arc<FixedRuntime>) {
    let runtime = FixedRuntime::new(allocated);
    let governor = MemoryGovernor::new(runtime.clone());
    (EngineHost::new(engine, governor), runtime)
}

#[test]
fn start_pins_policy_reports_and_checks_twice() {
    let (host, runtime) = host(FakeEngine::default(), 10 * MB);
    host.governor().set_policy(MB, 90);
    let lines = Lines::default();

    host.start(b"{}", Some(&lines)).unwrap();

    assert!(host.is_running());
    assert_eq!(runtime.memory_limit(), HARD_CEILING_BYTES);
    assert_eq!(runtime.collection_target(), AGGRESSIVE_COLLECTION_PERCENT);
    assert_eq!(host.engine().calls(), vec!["start:{}"]);

    let lines = lines.all();
    assert_eq!(lines[0], "Memory limit enforced: 50 MB");
    assert!(lines.contains(&"=== MEMORY STATISTICS ===".to_owned()));
    let usage_lines = lines
        .iter()
        .filter(|line| line.starts_with("Memory usage:"))
        .count();
    assert_eq!(usage_lines, 2);
}

#[test]
fn failed_start_is_reported_and_returned() {
    let engine = FakeEngine {
        fail_start: true,
        ..FakeEngine::default()
    };
    let (host, _runtime) = host(engine, 10 * MB);
    let lines = Lines::default();

    let err = host.start(b"not json", Some(&lines)).unwrap_err();

    assert!(matches!(err, HostError::Engine(EngineError::Config(_))));
    assert!(!host.is_running());
    assert_eq!(
        lines.all().last().map(String::as_str),
        Some("Start error: invalid engine config: unexpected token")
    );
}

#[test]
fn double_start_is_rejected() {
    let (host, _runtime) = host(FakeEngine::default(), 10 * MB);
    host.start(b"{}", None).unwrap();
    assert!(matches!(
        host.start(b"{}", None),
        Err(HostError::AlreadyRunning)
    ));
}

#[test]
fn stop_only_stops_a_running_engine() {
    let (host, _runtime) = host(FakeEngine::default(), 10 * MB);
    host.stop();
    assert!(host.engine().calls().is_empty());

    host.start(b"{}", None).unwrap();
    host.stop();
    host.stop();
    assert_eq!(host.engine().calls(), vec!["start:{}", "stop"]);
    assert!(!host.is_running());
}

#[test]
fn probe_defaults_url_and_always_reclaims() {
    let (host, runtime) = host(FakeEngine::default(), 10 * MB);
    host.governor().relax_policy();

    let delay = host.measure_outbound_delay(b"{}", "").unwrap();

    assert_eq!(delay, 42);
    assert_eq!(
        host.engine().calls(),
        vec![format!("probe:{DEFAULT_PROBE_URL}")]
    );
    assert_eq!(runtime.collection_target(), AGGRESSIVE_COLLECTION_PERCENT);
    assert_eq!(runtime.collections.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_probe_still_reclaims() {
    let engine = FakeEngine {
        fail_probe: true,
        ..FakeEngine::default()
    };
    let (host, runtime) = host(engine, 10 * MB);

    let err = host
        .measure_outbound_delay(b"{}", "https://example.com/204")
        .unwrap_err();

    assert!(matches!(err, HostError::Engine(EngineError::Probe(_))));
    assert_eq!(runtime.collections.load(Ordering::SeqCst), 1);
}

#[test]
fn usage_reflects_governor_sample() {
    let (host, _runtime) = host(FakeEngine::default(), 64 * MB);
    let usage = host.usage();
    assert_eq!(usage.current_mb, 64);
    assert!(!usage.within_limit);
}

#[test]
fn env_setters_export_engine_keys() {
    set_assets_directory("/opt/xray/assets");
    assert_eq!(
        std::env::var(ASSET_LOCATION_ENV).unwrap(),
        "/opt/xray/assets"
    );

    set_engine_env("xray.buf.readv", "enable");
    assert_eq!(std::env::var("xray.buf.readv").unwrap(), "enable");
}
