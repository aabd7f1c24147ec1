//! Driver implementations.
//!
//! - [`simulation`] - In-memory peripherals with fault injection
//! - [`linux`] - Raspberry Pi I2C, GPIO and serial (`hardware` feature)
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `HalDriver` trait from `simbox_common::hal::driver`
//! 3. Register it in [`register_all_drivers`]

#[cfg(feature = "hardware")]
pub mod linux;
pub mod simulation;

use crate::driver_registry::DriverRegistry;
use simbox_common::hal::driver::HalError;

/// Register all built-in drivers.
pub fn register_all_drivers(registry: &mut DriverRegistry) -> Result<(), HalError> {
    registry.register(simulation::DRIVER_NAME, simulation::create_driver)?;

    #[cfg(feature = "hardware")]
    registry.register(linux::DRIVER_NAME, linux::create_driver)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_is_always_available() {
        let mut registry = DriverRegistry::new();
        register_all_drivers(&mut registry).unwrap();
        assert!(registry.list_drivers().contains(&"simulation"));
        assert!(register_all_drivers(&mut registry).is_err());
    }
}
