//! Driver registry for peripheral drivers.
//!
//! Provides a `DriverRegistry` struct for registering and retrieving driver
//! factories. Built at startup and handed to the binary by value.

use simbox_common::config::SimboxConfig;
use simbox_common::hal::driver::{DriverFactory, HalDriver, HalError};
use std::collections::BTreeMap;
use tracing::info;

/// Registry of available drivers.
pub struct DriverRegistry {
    factories: BTreeMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a driver factory.
    ///
    /// # Errors
    /// Returns `HalError::ConfigError` if the name is already taken.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) -> Result<(), HalError> {
        if self.factories.contains_key(name) {
            return Err(HalError::ConfigError(format!(
                "Driver '{name}' is already registered"
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Get a driver factory by name.
    pub fn get_factory(&self, name: &str) -> Option<DriverFactory> {
        self.factories.get(name).copied()
    }

    /// Create a driver instance by name.
    ///
    /// # Errors
    /// Returns `HalError::DriverNotFound` if no driver with the given name is registered.
    pub fn create_driver(&self, name: &str) -> Result<Box<dyn HalDriver>, HalError> {
        let factory = self.get_factory(name).ok_or_else(|| {
            HalError::DriverNotFound(format!(
                "{name} (available: {})",
                self.list_drivers().join(", ")
            ))
        })?;
        Ok(factory())
    }

    /// Create a driver and initialize it against `config`.
    pub fn open(&self, name: &str, config: &SimboxConfig) -> Result<Box<dyn HalDriver>, HalError> {
        let mut driver = self.create_driver(name)?;
        info!("Using driver '{}' v{}", driver.name(), driver.version());
        driver.init(config)?;
        Ok(driver)
    }

    /// Registered driver names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::simulation::SimulationDriver;

    fn create_test_driver() -> Box<dyn HalDriver> {
        Box::new(SimulationDriver::new())
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = DriverRegistry::new();
        reg.register("test_driver", create_test_driver).unwrap();

        let driver = reg.create_driver("test_driver").expect("should create");
        assert_eq!(driver.name(), "simulation");
    }

    #[test]
    fn registry_driver_not_found() {
        let reg = DriverRegistry::new();
        let result = reg.create_driver("nonexistent");
        assert!(matches!(result, Err(HalError::DriverNotFound(_))));
    }

    #[test]
    fn registry_open_initializes() {
        let mut reg = DriverRegistry::new();
        reg.register("sim", create_test_driver).unwrap();

        let mut driver = reg.open("sim", &SimboxConfig::default()).unwrap();
        assert!(driver.write_serial(&[0; 29]).is_ok());

        match reg.open("missing", &SimboxConfig::default()) {
            Err(err) => assert!(err.to_string().contains("available: sim")),
            Ok(_) => panic!("opened an unregistered driver"),
        }
    }

    #[test]
    fn registry_list_drivers() {
        let mut reg = DriverRegistry::new();
        reg.register("beta", create_test_driver).unwrap();
        reg.register("alpha", create_test_driver).unwrap();
        assert_eq!(reg.list_drivers(), vec!["alpha", "beta"]);
    }

    #[test]
    fn registry_duplicate_rejected() {
        let mut reg = DriverRegistry::new();
        reg.register("dup", create_test_driver).unwrap();
        let err = reg.register("dup", create_test_driver).unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }
}
