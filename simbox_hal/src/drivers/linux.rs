//! Raspberry Pi driver: DACs on I2C, valve inputs and LEDs on GPIO, the
//! co-processor on a USB serial port.

use rppal::gpio::{Gpio, InputPin, OutputPin};
use rppal::i2c::I2c;
use serialport::SerialPort;
use simbox_common::config::SimboxConfig;
use simbox_common::hal::driver::{DriverDiagnostics, HalDriver, HalError};
use simbox_common::hal::types::StatusLed;
use std::collections::HashMap;
use std::io::Write;
use tracing::{info, warn};

/// Registry name of the Linux hardware driver.
pub const DRIVER_NAME: &str = "linux";

/// Factory function to create a Linux driver instance.
pub fn create_driver() -> Box<dyn HalDriver> {
    Box::new(LinuxDriver::new())
}

struct Peripherals {
    i2c: I2c,
    /// Address the bus is currently pointed at, to skip redundant ioctls.
    slave: Option<u16>,
    serial: Box<dyn SerialPort>,
    serial_timeout_ms: u64,
    inputs: HashMap<u8, InputPin>,
    ready_led: OutputPin,
    error_led: OutputPin,
}

/// Hardware driver for the bench controller.
pub struct LinuxDriver {
    peripherals: Option<Peripherals>,
    diagnostics: DriverDiagnostics,
}

impl LinuxDriver {
    /// Create an uninitialized driver.
    pub fn new() -> Self {
        Self {
            peripherals: None,
            diagnostics: DriverDiagnostics::default(),
        }
    }

    fn peripherals(&mut self) -> Result<&mut Peripherals, HalError> {
        self.peripherals.as_mut().ok_or(HalError::NotInitialized)
    }
}

impl Default for LinuxDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn init_err(what: &str, e: impl std::fmt::Display) -> HalError {
    HalError::InitFailed(format!("{what}: {e}"))
}

impl HalDriver for LinuxDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn init(&mut self, config: &SimboxConfig) -> Result<(), HalError> {
        info!(
            "Opening I2C bus {}, serial {} @ {} baud",
            config.bus.i2c_bus, config.serial.port, config.serial.baud_rate
        );

        let mut i2c = I2c::with_bus(config.bus.i2c_bus).map_err(|e| init_err("I2C", e))?;
        i2c.set_timeout(config.bus.timeout_ms as u32)
            .map_err(|e| init_err("I2C timeout", e))?;

        let serial = serialport::new(&config.serial.port, config.serial.baud_rate)
            .timeout(config.serial.timeout())
            .open()
            .map_err(|e| init_err(&config.serial.port, e))?;

        let gpio = Gpio::new().map_err(|e| init_err("GPIO", e))?;
        let mut inputs = HashMap::new();
        for pin in config.gpio.valve_pins {
            let input = gpio
                .get(pin)
                .map_err(|e| init_err(&format!("GPIO {pin}"), e))?
                .into_input();
            inputs.insert(pin, input);
        }
        let ready_led = gpio
            .get(config.gpio.ready_pin)
            .map_err(|e| init_err("ready LED", e))?
            .into_output_low();
        let error_led = gpio
            .get(config.gpio.error_pin)
            .map_err(|e| init_err("error LED", e))?
            .into_output_low();

        self.peripherals = Some(Peripherals {
            i2c,
            slave: None,
            serial,
            serial_timeout_ms: config.serial.timeout_ms,
            inputs,
            ready_led,
            error_led,
        });
        Ok(())
    }

    fn write_dac(&mut self, address: u16, frame: &[u8]) -> Result<(), HalError> {
        let p = self.peripherals()?;

        let result = (|| {
            if p.slave != Some(address) {
                p.i2c.set_slave_address(address)?;
                p.slave = Some(address);
            }
            p.i2c.write(frame)
        })();

        match result {
            Ok(n) if n == frame.len() => {
                self.diagnostics.bus_writes += 1;
                Ok(())
            }
            Ok(n) => {
                self.diagnostics.write_errors += 1;
                Err(HalError::CommunicationError(format!(
                    "dac@{address:#04x}: short write {n}/{}",
                    frame.len()
                )))
            }
            Err(e) => {
                self.diagnostics.write_errors += 1;
                Err(HalError::CommunicationError(format!("dac@{address:#04x}: {e}")))
            }
        }
    }

    fn write_serial(&mut self, frame: &[u8]) -> Result<(), HalError> {
        let p = self.peripherals()?;
        let timeout_ms = p.serial_timeout_ms;

        match p.serial.write_all(frame) {
            Ok(()) => {
                self.diagnostics.serial_writes += 1;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                self.diagnostics.write_errors += 1;
                Err(HalError::Timeout {
                    device: "serial".to_string(),
                    timeout_ms,
                })
            }
            Err(e) => {
                self.diagnostics.write_errors += 1;
                Err(HalError::CommunicationError(format!("serial: {e}")))
            }
        }
    }

    fn read_input(&mut self, pin: u8) -> Result<bool, HalError> {
        let p = self.peripherals()?;
        let level = p
            .inputs
            .get(&pin)
            .map(InputPin::is_high)
            .ok_or_else(|| HalError::ConfigError(format!("pin {pin} is not an input")))?;
        self.diagnostics.pin_reads += 1;
        Ok(level)
    }

    fn set_status(&mut self, led: StatusLed, on: bool) -> Result<(), HalError> {
        let p = self.peripherals()?;
        let pin = match led {
            StatusLed::Ready => &mut p.ready_led,
            StatusLed::Error => &mut p.error_led,
        };
        if on {
            pin.set_high();
        } else {
            pin.set_low();
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        if let Some(mut p) = self.peripherals.take() {
            if let Err(e) = p.serial.flush() {
                warn!("Serial flush on shutdown failed: {}", e);
            }
            info!("Linux driver released peripherals");
        }
        Ok(())
    }

    fn diagnostics(&self) -> Option<DriverDiagnostics> {
        Some(self.diagnostics.clone())
    }
}
