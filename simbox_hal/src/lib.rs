//! # Simbox HAL
//!
//! Peripheral drivers and auxiliary data producers for the control loop.
//! Drivers implement the `HalDriver` trait defined in
//! `simbox_common::hal::driver`.
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - Simulation and Linux hardware drivers
//! - [`producers`] - Mass-spec and UV reading sources
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        simbox_hal                          │
//! │  ┌─────────────────┐   create_driver()  ┌───────────────┐  │
//! │  │ DriverRegistry  ├───────────────────►│  HalDriver    │  │
//! │  │ simulation      │                    │  (trait obj)  │  │
//! │  │ linux (feature) │                    └───────────────┘  │
//! │  └─────────────────┘                                       │
//! │  ┌─────────────────┐   ┌─────────────┐                     │
//! │  │ MassSpecSource  │   │  UvSource   │  per-tick inputs    │
//! │  └─────────────────┘   └─────────────┘                     │
//! └────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod driver_registry;
pub mod drivers;
pub mod producers;

pub use crate::driver_registry::DriverRegistry;
pub use crate::drivers::register_all_drivers;
pub use crate::producers::{FakeMassSpec, FakeUv, MassSpecSource, UvSource};
