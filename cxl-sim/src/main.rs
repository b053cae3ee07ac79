// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulate a host driving CXL-attached memory through the bridge.
//!
//! See `lib.rs` for details.
use std::rc::Rc;

use clap::{Parser, ValueEnum};
use cxl_components::connect_port;
use cxl_engine::engine::Engine;
use cxl_engine::events::once::Once;
use cxl_engine::executor::Spawner;
use cxl_engine::time::clock::Clock;
use cxl_engine::traits::Event;
use cxl_engine::types::SimError;
use cxl_models::bridge::CxlBridge;
use cxl_models::bridge::config::{DevicePreset, OrderingPolicy};
use cxl_models::host::requester::Requester;
use cxl_models::host::traffic::RandomAccesses;
use cxl_models::memory::timing::{DramTiming, MemoryTiming};
use cxl_models::memory::{Memory, MemoryConfig, MemoryMetrics};
use cxl_sim::config::{DeviceKind, SimConfig};
use cxl_track::builder::{TrackerConfig, setup_trackers};
use cxl_track::entity::Entity;
use cxl_track::{Track, Tracker, error, info};

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Default,
    Asic,
    Fpga,
}

impl From<Preset> for DevicePreset {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Default => DevicePreset::Default,
            Preset::Asic => DevicePreset::Asic,
            Preset::Fpga => DevicePreset::Fpga,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Ordering {
    Relaxed,
    Strict,
}

#[derive(Clone, Copy, ValueEnum)]
enum Device {
    Fixed,
    Dram,
}

/// Command-line arguments.
///
/// Flags that are given override the configuration file and environment.
#[derive(Parser)]
#[command(about = "CXL.mem bridge simulation")]
struct Cli {
    /// Enable logging to the console.
    #[arg(long, default_value = "false")]
    stdout: bool,

    /// Level of log message to display.
    #[arg(long, default_value = "Info")]
    stdout_level: log::Level,

    /// Set a regular expression for which entites should have logging level set
    /// to `--stdout-level`. Others will have level set to `Error`.
    #[arg(long, default_value = "")]
    stdout_filter_regex: String,

    /// Write the log to this file instead of the console.
    #[arg(long)]
    log_file: Option<String>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<String>,

    /// Bridge defaults for the kind of device being modelled.
    #[arg(long, value_enum, default_value = "default")]
    preset: Preset,

    /// Response ordering.
    #[arg(long, value_enum)]
    ordering: Option<Ordering>,

    /// Device model behind the bridge.
    #[arg(long, value_enum)]
    device: Option<Device>,

    /// Depth of the in-flight tracker.
    #[arg(long)]
    max_outstanding: Option<usize>,

    /// Ticks before an outstanding request is failed.
    #[arg(long)]
    timeout_ticks: Option<u64>,

    /// Number of requests the host issues.
    #[arg(long)]
    num_requests: Option<usize>,

    /// Seed for the random traffic.
    #[arg(long)]
    seed: Option<u64>,

    /// Percentage of requests that are writes.
    #[arg(long)]
    write_percent: Option<u32>,

    /// Configure a clock tick on which to terminate the simulation. Use 0 to
    /// run until completion.
    #[arg(long, default_value = "0")]
    finish_tick: u64,
}

impl Cli {
    fn apply_overrides(&self, config: &mut SimConfig) {
        if let Some(ordering) = self.ordering {
            config.bridge.ordering = match ordering {
                Ordering::Relaxed => OrderingPolicy::Relaxed,
                Ordering::Strict => OrderingPolicy::Strict,
            };
        }
        if let Some(device) = self.device {
            config.device.kind = match device {
                Device::Fixed => DeviceKind::Fixed,
                Device::Dram => DeviceKind::Dram,
            };
        }
        if let Some(max_outstanding) = self.max_outstanding {
            config.bridge.max_outstanding = max_outstanding;
        }
        if let Some(timeout_ticks) = self.timeout_ticks {
            config.bridge.timeout_ticks = timeout_ticks;
        }
        if let Some(num_requests) = self.num_requests {
            config.traffic.num_requests = num_requests;
        }
        if let Some(seed) = self.seed {
            config.traffic.seed = seed;
        }
        if let Some(write_percent) = self.write_percent {
            config.traffic.write_percent = write_percent;
        }
    }
}

fn build_tracker(args: &Cli) -> Result<Tracker, SimError> {
    let config = TrackerConfig {
        enable: args.stdout || args.log_file.is_some(),
        level: args.stdout_level,
        filter_regex: &args.stdout_filter_regex,
        file: args.log_file.as_deref(),
    };
    setup_trackers(&config).map_err(|e| SimError(e.to_string()))
}

/// Install an event that stops the simulation at the clock tick defined.
fn finish_at(spawner: &Spawner, clock: Clock, run_ticks: u64) -> Once<()> {
    let finish = Once::default();
    let notify = finish.clone();
    spawner.spawn(async move {
        // Only stop a simulation that is still running
        clock.wait_ticks_or_exit(run_ticks).await;
        notify.notify()
    });
    finish
}

/// Create the memory behind the bridge and return a way to read its
/// metrics after the run.
fn attach_memory<M>(
    engine: &Engine,
    clock: &Clock,
    top: &Rc<Entity>,
    bridge: &Rc<CxlBridge>,
    timing: M,
) -> Result<Box<dyn Fn() -> MemoryMetrics>, SimError>
where
    M: MemoryTiming + 'static,
{
    let range = bridge.range();
    let memory = Memory::new_and_register(
        engine,
        clock,
        top,
        "memory",
        MemoryConfig::new(range.base(), range.size()),
        timing,
    )?;
    connect_port!(bridge, mem_side => memory, rx)?;
    connect_port!(memory, tx => bridge, mem_side_response)?;
    bridge.set_functional_target(memory.clone());
    Ok(Box::new(move || memory.metrics()))
}

fn main() -> Result<(), SimError> {
    let args = Cli::parse();
    let tracker = build_tracker(&args)?;

    let mut config = SimConfig::load(
        &SimConfig::for_device(args.preset.into()),
        args.config.as_deref(),
    )?;
    args.apply_overrides(&mut config);

    let mut engine = Engine::new(&tracker);
    let spawner = engine.spawner();
    let clock = engine.default_clock();
    let top = engine.top().clone();

    let bridge = CxlBridge::new_and_register(&engine, &clock, &top, "bridge", &config.bridge)?;
    info!(top ; "Bridge {} with {:?} ordering and {} outstanding",
        bridge.range(), config.bridge.ordering, config.bridge.max_outstanding);

    let memory_metrics = match config.device.kind {
        DeviceKind::Fixed => attach_memory(&engine, &clock, &top, &bridge, config.device.fixed)?,
        DeviceKind::Dram => attach_memory(
            &engine,
            &clock,
            &top,
            &bridge,
            DramTiming::new(config.device.dram),
        )?,
    };

    let traffic = &config.traffic;
    let requests = RandomAccesses::new(
        traffic.seed,
        bridge.range().base(),
        traffic.window_bytes.min(bridge.range().size()),
        traffic.access_bytes,
        traffic.write_percent,
        traffic.num_requests,
    )
    .collect();
    let requester = Requester::new_and_register(
        &engine,
        &clock,
        &top,
        "host",
        bridge.clone(),
        requests,
        traffic.issue_interval,
    )?;
    connect_port!(bridge, cpu_side => requester, rx)?;

    info!(top ; "Platform built and connected");

    if args.finish_tick != 0 {
        let finish = finish_at(&spawner, clock.clone(), args.finish_tick);
        engine.run_until(Box::new(finish))?;
    } else {
        engine.run()?;
    }

    let stats = bridge.stats();
    let metrics = memory_metrics();
    info!(top ; "Finished at {:.2}ns", clock.time_now_ns());
    info!(top ; "{}", stats);
    info!(top ; "Memory: {} reads ({} bytes), {} writes ({} bytes), {} poisoned",
        metrics.reads, metrics.bytes_read, metrics.writes, metrics.bytes_written, metrics.poisoned);

    let expected = requester.num_accepted();
    let responses = requester.num_responses();
    if args.finish_tick == 0 && responses != expected {
        error!(top ; "{}/{} responses received", responses, expected);
        tracker.shutdown();
        return Err(SimError(format!(
            "{} accepted requests never completed",
            expected - responses
        )));
    }
    Ok(())
}
