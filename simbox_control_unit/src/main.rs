//! # Simbox Control Unit
//!
//! Runs the simbox control loop at the configured frequency until SIGINT or
//! SIGTERM, then releases the status LEDs, the driver, and the shared
//! memory regions in that order.
//!
//! # Usage
//!
//! ```bash
//! # Simulated peripherals, default config
//! simbox_control_unit --simulate
//!
//! # Bench hardware (built with --features hardware)
//! simbox_control_unit --config /etc/simbox/config.toml --driver linux
//!
//! # 200 ticks with debug logging
//! simbox_control_unit -s -v --cycles 200
//! ```

use clap::Parser;
use simbox_common::config::{ConfigError, ConfigLoader, SimboxConfig};
use simbox_common::consts::DEFAULT_CONFIG_PATH;
use simbox_common::hal::driver::{HalDriver, StatusIndicator};
use simbox_control_unit::cycle::CycleEngine;
use simbox_control_unit::error::InitError;
use simbox_control_unit::scheduler::{Scheduler, rt_setup};
use simbox_hal::{DriverRegistry, register_all_drivers};
use simbox_shared_memory::{SharedStateStore, StoreConfig};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Simbox Control Unit - fixed-rate sensor to DAC / co-processor loop
#[derive(Parser, Debug)]
#[command(name = "simbox_control_unit")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Fixed-rate simbox control loop")]
struct Args {
    /// Path to the configuration TOML. Without it the default path is tried
    /// and built-in defaults are used if it does not exist.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Driver to load (see the driver registry).
    #[arg(short, long)]
    driver: Option<String>,

    /// Force the simulation driver.
    #[arg(short = 's', long)]
    simulate: bool,

    /// Stop after this many ticks instead of running until signalled.
    #[arg(long, value_name = "N")]
    cycles: Option<u64>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = load_config(args.config.as_deref());

    let level = match &config {
        Ok((config, _)) => config.shared.log_level.into(),
        Err(_) => Level::INFO,
    };
    setup_tracing(&args, level);

    info!("Simbox Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config.map_err(InitError::from).and_then(|(config, source)| {
        match source {
            Some(path) => info!("Config loaded from {}", path.display()),
            None => warn!(
                "No config at {}, using built-in defaults",
                DEFAULT_CONFIG_PATH
            ),
        }
        run(&args, &config)
    });

    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Simbox Control Unit shutdown complete");
}

/// Load and validate the configuration. Returns the path it came from, or
/// `None` when the default file is absent and defaults are used.
fn load_config(path: Option<&Path>) -> Result<(SimboxConfig, Option<PathBuf>), ConfigError> {
    let (config, source) = match path {
        Some(path) => (SimboxConfig::load(path)?, Some(path.to_path_buf())),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            match SimboxConfig::load(&default) {
                Ok(config) => (config, Some(default)),
                Err(ConfigError::FileNotFound(_)) => (SimboxConfig::default(), None),
                Err(e) => return Err(e),
            }
        }
    };
    config.validate()?;
    Ok((config, source))
}

fn driver_name(args: &Args) -> String {
    if args.simulate {
        info!("Simulation mode enabled");
        return simbox_hal::drivers::simulation::DRIVER_NAME.to_string();
    }
    if let Some(name) = &args.driver {
        return name.clone();
    }
    #[cfg(feature = "hardware")]
    {
        simbox_hal::drivers::linux::DRIVER_NAME.to_string()
    }
    #[cfg(not(feature = "hardware"))]
    {
        simbox_hal::drivers::simulation::DRIVER_NAME.to_string()
    }
}

fn shutdown_driver(driver: &mut dyn HalDriver) {
    if let Err(e) = driver.shutdown() {
        warn!("Driver shutdown failed: {}", e);
    }
}

fn run(args: &Args, config: &SimboxConfig) -> Result<(), InitError> {
    info!(
        "Config OK: {} Hz, shm {}, DAC0 {:#04x}, DAC1 {:#04x}, serial {} @ {}",
        config.cycle.frequency_hz,
        config.shm.dir.display(),
        config.bus.dac0_address,
        config.bus.dac1_address,
        config.serial.port,
        config.serial.baud_rate
    );

    rt_setup(config.cycle.cpu_core, config.cycle.rt_priority)?;
    #[cfg(feature = "rt")]
    info!(
        "RT setup complete (cpu_core={}, priority={})",
        config.cycle.cpu_core, config.cycle.rt_priority
    );

    // Stop flag before any resource is acquired
    let mut scheduler = Scheduler::new(config.cycle.period());
    let stop = scheduler.stop_handle();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        stop.store(true, Ordering::Release);
    })?;

    // Driver
    let mut registry = DriverRegistry::new();
    register_all_drivers(&mut registry)?;
    let name = driver_name(args);
    let mut driver = registry.open(&name, config)?;

    // Shared state
    let store = match SharedStateStore::create(&StoreConfig::from_config(config)) {
        Ok(store) => store,
        Err(e) => {
            shutdown_driver(driver.as_mut());
            return Err(e.into());
        }
    };

    let mut engine = CycleEngine::new(config, store, driver);

    let job = |_tick| {
        engine.run_cycle();
    };
    let result = match args.cycles {
        Some(n) => scheduler.run_for(n, job),
        None => scheduler.run_forever(job),
    }
    .map_err(InitError::from);

    // Shutdown: LEDs off, driver, then shared memory
    let counters = engine.counters().clone();
    let stats = scheduler.stats();
    info!(
        "Ran {} ticks: {} skipped, write failures dac0/dac1/serial {:?}, {} pin read failures, {} overruns, avg {} µs",
        counters.ticks,
        counters.skipped,
        counters.write_failures,
        counters.pin_read_failures,
        stats.overruns,
        stats.avg_tick_ns() / 1_000
    );

    let (mut store, mut driver) = engine.into_parts();
    driver.clear();
    shutdown_driver(driver.as_mut());
    if let Err(e) = store.release() {
        error!("Shared state release failed: {}", e);
    }

    result
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args, level: Level) {
    let level = if args.verbose { Level::DEBUG } else { level };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
