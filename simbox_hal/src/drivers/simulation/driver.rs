//! Simulation driver implementation.

use super::state::{Fault, FaultPoint, SimHandle};
use simbox_common::config::SimboxConfig;
use simbox_common::hal::driver::{DriverDiagnostics, HalDriver, HalError};
use simbox_common::hal::types::StatusLed;
use std::time::Duration;
use tracing::{debug, info};

/// Simulation driver implementing the HalDriver trait.
pub struct SimulationDriver {
    version: &'static str,
    initialized: bool,
    handle: SimHandle,
    dac_addresses: [u16; 2],
    bus_timeout: Duration,
    serial_timeout: Duration,
}

impl SimulationDriver {
    /// Create a driver with its own private state.
    pub fn new() -> Self {
        Self::with_handle(SimHandle::new())
    }

    /// Create a driver backed by an existing handle, so a test can observe
    /// and disturb the peripherals.
    pub fn with_handle(handle: SimHandle) -> Self {
        let defaults = SimboxConfig::default();
        Self {
            version: env!("CARGO_PKG_VERSION"),
            initialized: false,
            handle,
            dac_addresses: [defaults.bus.dac0_address, defaults.bus.dac1_address],
            bus_timeout: defaults.bus.timeout(),
            serial_timeout: defaults.serial.timeout(),
        }
    }

    /// Handle to the simulated peripherals.
    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }

    fn ensure_initialized(&self) -> Result<(), HalError> {
        if self.initialized {
            Ok(())
        } else {
            Err(HalError::NotInitialized)
        }
    }

    /// Apply an injected fault to a write bounded by `timeout`.
    fn apply_write_fault(
        fault: Option<Fault>,
        device: &str,
        timeout: Duration,
    ) -> Result<(), HalError> {
        match fault {
            None => Ok(()),
            Some(Fault::FailOnce | Fault::FailAlways) => Err(HalError::CommunicationError(
                format!("{device}: simulated write failure"),
            )),
            Some(Fault::Delay(delay)) if delay > timeout => {
                std::thread::sleep(timeout);
                Err(HalError::Timeout {
                    device: device.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Some(Fault::Delay(delay)) => {
                std::thread::sleep(delay);
                Ok(())
            }
        }
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl HalDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        super::DRIVER_NAME
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn init(&mut self, config: &SimboxConfig) -> Result<(), HalError> {
        info!(
            "Initializing simulation driver: DAC0 {:#04x}, DAC1 {:#04x}, serial {}, {} valve pins",
            config.bus.dac0_address,
            config.bus.dac1_address,
            config.serial.port,
            config.gpio.valve_pins.len()
        );

        self.dac_addresses = [config.bus.dac0_address, config.bus.dac1_address];
        self.bus_timeout = config.bus.timeout();
        self.serial_timeout = config.serial.timeout();

        // Unset valve pins idle at their configured default level.
        self.handle.with(|state| {
            for (pin, level) in config
                .gpio
                .valve_pins
                .iter()
                .zip(config.gpio.initial_valve_states)
            {
                state.inputs.entry(*pin).or_insert(level);
            }
            for led in StatusLed::ALL {
                state.leds.insert(led, false);
            }
        });

        self.initialized = true;
        Ok(())
    }

    fn write_dac(&mut self, address: u16, frame: &[u8]) -> Result<(), HalError> {
        self.ensure_initialized()?;
        if !self.dac_addresses.contains(&address) {
            return Err(HalError::CommunicationError(format!(
                "no device acknowledged address {address:#04x}"
            )));
        }

        let fault = self.handle.with(|s| s.take_fault(FaultPoint::Dac(address)));
        let device = format!("dac@{address:#04x}");
        let result = Self::apply_write_fault(fault, &device, self.bus_timeout);

        self.handle.with(|state| match &result {
            Ok(()) => state.record_dac(address, frame),
            Err(_) => state.diagnostics.write_errors += 1,
        });
        result
    }

    fn write_serial(&mut self, frame: &[u8]) -> Result<(), HalError> {
        self.ensure_initialized()?;

        let fault = self.handle.with(|s| s.take_fault(FaultPoint::Serial));
        let result = Self::apply_write_fault(fault, "serial", self.serial_timeout);

        self.handle.with(|state| match &result {
            Ok(()) => state.record_serial(frame),
            Err(_) => state.diagnostics.write_errors += 1,
        });
        result
    }

    fn read_input(&mut self, pin: u8) -> Result<bool, HalError> {
        self.ensure_initialized()?;

        self.handle.with(|state| {
            state.diagnostics.pin_reads += 1;
            match state.take_fault(FaultPoint::Pin(pin)) {
                Some(Fault::FailOnce | Fault::FailAlways) => Err(HalError::CommunicationError(
                    format!("pin {pin}: simulated read failure"),
                )),
                _ => state
                    .inputs
                    .get(&pin)
                    .copied()
                    .ok_or_else(|| HalError::ConfigError(format!("pin {pin} is not an input"))),
            }
        })
    }

    fn set_status(&mut self, led: StatusLed, on: bool) -> Result<(), HalError> {
        self.ensure_initialized()?;

        self.handle.with(|state| match state.take_fault(FaultPoint::Status(led)) {
            Some(Fault::FailOnce | Fault::FailAlways) => Err(HalError::CommunicationError(
                format!("{led} LED: simulated failure"),
            )),
            _ => {
                state.leds.insert(led, on);
                Ok(())
            }
        })
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        info!("Shutting down simulation driver");
        let diag = self.handle.diagnostics();
        debug!(
            "Simulation totals: {} bus writes, {} serial writes, {} write errors, {} pin reads",
            diag.bus_writes, diag.serial_writes, diag.write_errors, diag.pin_reads
        );
        self.initialized = false;
        Ok(())
    }

    fn diagnostics(&self) -> Option<DriverDiagnostics> {
        Some(self.handle.diagnostics())
    }
}
