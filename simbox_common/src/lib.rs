//! Simbox Common Library
//!
//! Shared constants, data types and configuration loading for all simbox
//! workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Channel map, device addresses, vector and frame sizes
//! - [`sensors`] - `SensorVector` / `ValveStateVector` fixed-layout types
//! - [`calibration`] - `CalibrationFunction` tagged variant
//! - [`config`] - TOML configuration loading and validation
//! - [`hal`] - HAL driver trait and error types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use simbox_common::prelude::*;
//!
//! let sensors = SensorVector::default();
//! assert_eq!(sensors.as_slice().len(), SENSOR_COUNT);
//! ```

pub mod calibration;
pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
pub mod sensors;
