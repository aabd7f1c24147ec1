//! Prelude module for common re-exports.
//!
//! ```rust
//! use simbox_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, FuzzConfig, SharedConfig, SimboxConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{
    DAC0_FRAME_LEN, DAC1_FRAME_LEN, DIGITAL_FRAME_LEN, FREQUENCY_HZ, SENSOR_COUNT, VALVE_COUNT,
};

// ─── Data Types ─────────────────────────────────────────────────────
pub use crate::calibration::CalibrationFunction;
pub use crate::sensors::{ChannelGroup, SensorVector, ValveStateVector};

// ─── HAL ────────────────────────────────────────────────────────────
pub use crate::hal::driver::{DriverFactory, HalDriver, HalError, StatusIndicator};
pub use crate::hal::types::{OutputTarget, StatusLed};
