//! HAL driver trait and error types.
//!
//! This module defines:
//! - `HalDriver` trait - Interface for pluggable peripheral drivers
//! - `HalError` enum - Error types for HAL operations
//! - `DriverFactory` type alias - Factory function type
//! - `StatusIndicator` trait - Ready/error hooks on top of any driver

use crate::config::SimboxConfig;
use crate::hal::types::StatusLed;
use thiserror::Error;

/// Error types for HAL operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Driver initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Hardware communication error
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// A write did not complete within its timeout
    #[error("Timed out after {timeout_ms} ms writing to {device}")]
    Timeout {
        /// Device that timed out
        device: String,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Operation on a driver that was never initialized or already shut down
    #[error("Driver not initialized")]
    NotInitialized,
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn HalDriver>;

/// Optional driver diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DriverDiagnostics {
    /// Successful bus writes
    pub bus_writes: u64,
    /// Successful serial writes
    pub serial_writes: u64,
    /// Failed writes of either kind
    pub write_errors: u64,
    /// Pin reads performed
    pub pin_reads: u64,
}

/// Trait defining the interface for peripheral drivers.
///
/// The control unit manages its peripherals through this trait, enabling
/// pluggable backends (simulation, Raspberry Pi hardware).
///
/// # Lifecycle
///
/// 1. `init()` - Called once before the loop starts
/// 2. `write_dac()` / `write_serial()` / `read_input()` - Called every tick
/// 3. `shutdown()` - Called once after the loop has stopped
///
/// # Timing Contracts
///
/// | Operation | Max Duration | Constraint |
/// |-----------|--------------|------------|
/// | `init()` | unbounded | pre-loop |
/// | `write_dac()` | `bus.timeout_ms` | **HARD** |
/// | `write_serial()` | `serial.timeout_ms` | **HARD** |
/// | `read_input()` | a few µs | **HARD** |
/// | `shutdown()` | 1 second | post-loop |
///
/// A write that cannot finish in time must return `HalError::Timeout`
/// rather than block.
pub trait HalDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation", "linux").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Open the bus, serial port and pins described by `config`.
    ///
    /// # Errors
    /// Return `HalError::InitFailed` if any peripheral cannot be acquired.
    fn init(&mut self, config: &SimboxConfig) -> Result<(), HalError>;

    /// Write one analog frame to the DAC at `address`.
    fn write_dac(&mut self, address: u16, frame: &[u8]) -> Result<(), HalError>;

    /// Write one digital frame to the co-processor.
    fn write_serial(&mut self, frame: &[u8]) -> Result<(), HalError>;

    /// Read the level of an input pin.
    fn read_input(&mut self, pin: u8) -> Result<bool, HalError>;

    /// Drive a status LED.
    fn set_status(&mut self, led: StatusLed, on: bool) -> Result<(), HalError>;

    /// Release all peripherals.
    fn shutdown(&mut self) -> Result<(), HalError>;

    /// Get driver-specific diagnostics.
    /// Default: None
    fn diagnostics(&self) -> Option<DriverDiagnostics> {
        None
    }
}

/// Ready/error hooks exposed by the control loop.
///
/// Status indication is best effort: a failing LED never affects a tick, so
/// failures are only logged.
pub trait StatusIndicator {
    /// Switch the ready indicator.
    fn ready(&mut self, on: bool);

    /// Switch the error indicator.
    fn error(&mut self, on: bool);

    /// Switch both indicators off.
    fn clear(&mut self) {
        self.ready(false);
        self.error(false);
    }
}

impl<D: HalDriver + ?Sized> StatusIndicator for D {
    fn ready(&mut self, on: bool) {
        if let Err(e) = self.set_status(StatusLed::Ready, on) {
            tracing::warn!("Failed to set {} indicator: {}", StatusLed::Ready, e);
        }
    }

    fn error(&mut self, on: bool) {
        if let Err(e) = self.set_status(StatusLed::Error, on) {
            tracing::warn!("Failed to set {} indicator: {}", StatusLed::Error, e);
        }
    }
}
