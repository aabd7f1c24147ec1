//! Simulation driver module.
//!
//! In-memory peripherals for development and testing without hardware.
//! Every write is recorded and can be inspected through a [`SimHandle`],
//! and faults can be injected per device.

mod driver;
mod state;

pub use driver::SimulationDriver;
pub use state::{Fault, FaultPoint, SimHandle, SimState};

use simbox_common::hal::driver::HalDriver;

/// Registry name of the simulation driver.
pub const DRIVER_NAME: &str = "simulation";

/// Factory function to create a simulation driver instance.
pub fn create_driver() -> Box<dyn HalDriver> {
    Box::new(SimulationDriver::new())
}
