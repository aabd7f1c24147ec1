//! Hardware abstraction layer for the simbox peripherals.
//!
//! The control loop never talks to a bus, serial port or GPIO line directly;
//! it goes through a [`driver::HalDriver`] implementation chosen at startup.

pub mod driver;
pub mod types;
