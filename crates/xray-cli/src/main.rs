use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use xray_config::{init_tracing, XrayConfig};
use xray_memory::{
    HealOutcome, MemoryGovernor, MemoryObserver, MonitorConfig, ProcessRuntime,
    TrackingAllocator,
};

#[global_allocator]
static ALLOC: TrackingAllocator = TrackingAllocator;

#[derive(Parser)]
#[command(
    name = "xray-governor",
    version,
    about = "Inspect and exercise the xray memory governor"
)]
struct Cli {
    /// Config file (defaults to `$XRAY_CONFIG`, then `./xray.toml`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the memory statistics block
    Stats(StatsArgs),
    /// Re-assert the memory policy and check usage against the ceiling
    Enforce,
    /// Force a reclamation pass and print statistics afterwards
    Reclaim,
    /// Run the background monitor for a while, then stop it
    Monitor(MonitorArgs),
    /// Walk through the governor's operations end to end
    Demo(DemoArgs),
}

#[derive(Args)]
struct StatsArgs {
    /// Emit JSON suitable for scripts
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct MonitorArgs {
    /// How long to keep the monitor running
    #[arg(long, default_value_t = 60)]
    duration_secs: u64,
    /// Check interval (defaults to the configured interval)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval_secs: Option<u64>,
}

#[derive(Args)]
struct DemoArgs {
    /// How long the monitor runs during the walkthrough
    #[arg(long, default_value_t = 5)]
    wait_secs: u64,
}

/// Writes governor lines to stdout.
struct StdoutObserver;

impl MemoryObserver for StdoutObserver {
    fn log_line(&self, line: &str) {
        println!("[xray] {line}");
    }
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = XrayConfig::load(cli.config.as_deref()).context("failed to load config")?;
    init_tracing(&config.logging);

    let governor = MemoryGovernor::for_process(ProcessRuntime::new());
    config.memory.apply(&governor);
    tracing::debug!(target: "xray.memory", policy = ?governor.policy(), "governor ready");

    match cli.command {
        Command::Stats(args) => {
            let stats = governor.sample();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                governor.log_stats(Some(&StdoutObserver));
            }
            Ok(0)
        }
        Command::Enforce => {
            let outcome = governor.assert_policy(Some(&StdoutObserver));
            Ok(exit_code_for(&outcome))
        }
        Command::Reclaim => {
            governor.force_reclaim();
            governor.log_stats(Some(&StdoutObserver));
            Ok(0)
        }
        Command::Monitor(args) => {
            let interval = args
                .interval_secs
                .map(|secs| MonitorConfig {
                    interval: Duration::from_secs(secs),
                })
                .unwrap_or_else(|| config.memory.monitor_config());
            let runtime = build_runtime()?;
            run_monitor(
                &runtime,
                &governor,
                interval,
                Duration::from_secs(args.duration_secs),
            );
            Ok(0)
        }
        Command::Demo(args) => {
            let runtime = build_runtime()?;
            demo(&runtime, &governor, &config, Duration::from_secs(args.wait_secs));
            Ok(0)
        }
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
}

fn run_monitor(
    runtime: &tokio::runtime::Runtime,
    governor: &MemoryGovernor,
    config: MonitorConfig,
    duration: Duration,
) {
    let observer: Arc<dyn MemoryObserver> = Arc::new(StdoutObserver);
    let monitor = governor.start_monitor_with(runtime.handle(), config, Some(observer));
    runtime.block_on(async {
        tokio::time::sleep(duration).await;
        monitor.stop_and_join().await;
    });
}

fn demo(
    runtime: &tokio::runtime::Runtime,
    governor: &MemoryGovernor,
    config: &XrayConfig,
    wait: Duration,
) {
    println!("=== MEMORY GOVERNOR DEMO ===");

    println!("\n1. Initial memory state:");
    governor.log_stats(Some(&StdoutObserver));

    println!("\n2. Enforcing the memory limit:");
    governor.assert_policy(Some(&StdoutObserver));

    println!("\n3. Basic usage:");
    let usage = governor.usage();
    println!("Current usage: {} MB", usage.current_mb);
    println!("Limit: {} MB", usage.limit_mb);
    println!("Within limit: {}", usage.within_limit);

    println!("\n4. Detailed statistics:");
    let stats = governor.sample();
    println!("Allocated: {} MB", stats.allocated_mb());
    println!("Total ever allocated: {} MB", stats.total_allocated_mb());
    println!("System memory: {} MB", stats.system_mb());
    println!("GC cycle count: {}", stats.gc_cycle_count);

    if config.memory.monitor {
        println!("\n5. Starting the background monitor...");
        run_monitor(runtime, governor, config.memory.monitor_config(), wait);
        println!("\n6. Monitor stopped.");
    } else {
        println!("\n5. Background monitor disabled by config.");
    }

    println!("\n7. Forcing reclamation:");
    governor.force_reclaim();
    governor.log_stats(Some(&StdoutObserver));

    println!("\n=== DEMO COMPLETE ===");
}

fn exit_code_for(outcome: &HealOutcome) -> i32 {
    match outcome {
        HealOutcome::Critical { .. } => 1,
        HealOutcome::WithinLimit { .. } | HealOutcome::Healed { .. } => 0,
    }
}
