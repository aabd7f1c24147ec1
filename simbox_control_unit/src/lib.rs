//! # Simbox Control Unit Library
//!
//! Fixed-rate control loop for the simbox bench. Every period it reads the
//! shared sensor vector, runs it through the fuzz transform and the
//! calibration bank, encodes two DAC frames and one co-processor frame,
//! writes them out, and publishes the valve feedback pins back to shared
//! memory.
//!
//! ## Components
//!
//! - [`codec`]: channel codec, values to wire bytes
//! - [`calibration`]: per-channel inverse calibrations
//! - [`fuzz`]: noise applied before calibration
//! - [`cycle`]: the per-tick engine
//! - [`scheduler`]: fixed-rate, non-overlapping tick driver and RT setup
//! - [`error`]: tick and startup errors
//!
//! ## Example
//!
//! ```no_run
//! use simbox_common::config::SimboxConfig;
//! use simbox_control_unit::cycle::CycleEngine;
//! use simbox_control_unit::scheduler::Scheduler;
//! use simbox_hal::drivers::simulation::SimulationDriver;
//! use simbox_common::hal::driver::HalDriver;
//! use simbox_shared_memory::{SharedStateStore, StoreConfig};
//!
//! let config = SimboxConfig::default();
//! let store = SharedStateStore::create(&StoreConfig::from_config(&config))?;
//! let mut driver = SimulationDriver::new();
//! driver.init(&config)?;
//!
//! let mut engine = CycleEngine::new(&config, store, Box::new(driver));
//! let mut scheduler = Scheduler::new(config.cycle.period());
//! scheduler.run_for(100, |_| {
//!     engine.run_cycle();
//! })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod calibration;
pub mod codec;
pub mod cycle;
pub mod error;
pub mod fuzz;
pub mod scheduler;

pub use crate::calibration::CalibrationBank;
pub use crate::codec::{AnalogFrame, ChannelCodec, DacCodec, DigitalFrame};
pub use crate::cycle::{CycleCounters, CycleEngine, TickFrames, TickOutcome};
pub use crate::error::{InitError, ScheduleError, TickError};
pub use crate::fuzz::FuzzModel;
pub use crate::scheduler::{ScheduleStats, Scheduler, rt_setup};
