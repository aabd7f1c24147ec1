//! Configuration loading traits and types.
//!
//! Every field of [`SimboxConfig`] defaults to the bench constants in
//! [`crate::consts`], so an empty TOML file yields the reference setup.
//!
//! # Usage
//!
//! ```rust,no_run
//! use simbox_common::config::{ConfigLoader, ConfigError, SimboxConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = SimboxConfig::load(Path::new("config.toml"))?;
//!     config.validate()?;
//!     println!("Loop period: {:?}", config.cycle.period());
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::calibration::CalibrationFunction;
use crate::consts::{
    DAC_VREF, DAC0_ADDRESS, DAC1_ADDRESS, DEFAULT_BAUD_RATE, DEFAULT_I2C_BUS,
    DEFAULT_SERIAL_PORT, DEFAULT_SHM_DIR, ERROR_LED_PIN, ERROR_STATE, FREQUENCY_HZ,
    FREQUENCY_HZ_MAX, FREQUENCY_HZ_MIN, IO_TIMEOUT_MS, IR_CHANNELS, IR_FLOW_COUNT,
    MASS_SPEC_CHANNELS, MASS_SPEC_COUNT, PRESSURE_CHANNELS, PRESSURE_COUNT, READY_LED_PIN,
    SENSOR_REGION_NAME, THERMISTOR_CHANNELS, THERMISTOR_COUNT, UV_BAND_COUNT, UV_SCALE,
    VALVE_COUNT, VALVE_PINS, VALVE_REGION_NAME,
};

/// Highest channel address a DAC accepts.
const DAC_CHANNEL_MAX: u8 = 0x7;

/// Highest 7-bit bus address.
const BUS_ADDRESS_MAX: u16 = 0x7F;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields shared by every simbox binary.
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "simbox-bench-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_service_name() -> String {
    "simbox".to_string()
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `DeserializeOwned` type.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.to_path_buf())
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Top-Level Config ───────────────────────────────────────────────

/// Complete simbox configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimboxConfig {
    /// Shared service settings.
    pub shared: SharedConfig,
    /// Loop pacing.
    #[serde(rename = "loop")]
    pub cycle: LoopConfig,
    /// Shared memory regions.
    pub shm: ShmConfig,
    /// DAC bus.
    pub bus: BusConfig,
    /// Co-processor serial link.
    pub serial: SerialConfig,
    /// Valve inputs and status LEDs.
    pub gpio: GpioConfig,
    /// DAC channel addresses.
    pub channels: ChannelMap,
    /// Per-channel calibration.
    pub calibration: CalibrationConfig,
    /// Wire encoding parameters.
    pub codec: CodecConfig,
    /// Noise transform applied before calibration.
    pub fuzz: FuzzConfig,
    /// Stand-in mass-spec / UV producers.
    pub producers: ProducerConfig,
}

impl SimboxConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.cycle.validate()?;
        self.shm.validate()?;
        self.bus.validate()?;
        self.serial.validate()?;
        self.gpio.validate()?;
        self.channels.validate()?;
        self.calibration.validate()?;
        self.codec.validate()?;
        self.fuzz.validate()?;
        self.producers.validate()?;
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

// ─── Sections ───────────────────────────────────────────────────────

/// Loop pacing and RT settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Tick frequency [Hz].
    pub frequency_hz: f64,
    /// SCHED_FIFO priority (`rt` feature only).
    pub rt_priority: i32,
    /// CPU core to pin the loop thread to (`rt` feature only).
    pub cpu_core: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            frequency_hz: FREQUENCY_HZ,
            rt_priority: 80,
            cpu_core: 0,
        }
    }
}

impl LoopConfig {
    /// Tick period.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency_hz)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(FREQUENCY_HZ_MIN..=FREQUENCY_HZ_MAX).contains(&self.frequency_hz) {
            return Err(invalid(format!(
                "loop.frequency_hz {} out of range [{}, {}]",
                self.frequency_hz, FREQUENCY_HZ_MIN, FREQUENCY_HZ_MAX
            )));
        }
        if !(1..=99).contains(&self.rt_priority) {
            return Err(invalid(format!(
                "loop.rt_priority {} out of range [1, 99]",
                self.rt_priority
            )));
        }
        Ok(())
    }
}

/// Shared memory region settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShmConfig {
    /// Directory holding the region files.
    pub dir: PathBuf,
    /// Sensor region name.
    pub sensor_region: String,
    /// Valve region name.
    pub valve_region: String,
    /// Remove region files left behind by a dead writer.
    pub replace_stale: bool,
    /// Bounded retries for a consistent read before giving up on a tick.
    pub read_retries: u32,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_SHM_DIR),
            sensor_region: SENSOR_REGION_NAME.to_string(),
            valve_region: VALVE_REGION_NAME.to_string(),
            replace_stale: true,
            read_retries: 10,
        }
    }
}

impl ShmConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sensor_region.is_empty() || self.valve_region.is_empty() {
            return Err(invalid("shm region names cannot be empty"));
        }
        if self.sensor_region == self.valve_region {
            return Err(invalid(format!(
                "shm.sensor_region and shm.valve_region are both '{}'",
                self.sensor_region
            )));
        }
        if self.read_retries == 0 {
            return Err(invalid("shm.read_retries must be at least 1"));
        }
        Ok(())
    }
}

/// DAC bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// I2C bus number.
    pub i2c_bus: u8,
    /// DAC0 address.
    pub dac0_address: u16,
    /// DAC1 address.
    pub dac1_address: u16,
    /// Write timeout [ms].
    pub timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            i2c_bus: DEFAULT_I2C_BUS,
            dac0_address: DAC0_ADDRESS,
            dac1_address: DAC1_ADDRESS,
            timeout_ms: IO_TIMEOUT_MS,
        }
    }
}

impl BusConfig {
    /// Write timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dac0_address == self.dac1_address {
            return Err(invalid(format!(
                "bus.dac0_address and bus.dac1_address are both {:#04x}",
                self.dac0_address
            )));
        }
        for addr in [self.dac0_address, self.dac1_address] {
            if addr > BUS_ADDRESS_MAX {
                return Err(invalid(format!("bus address {addr:#x} exceeds 7 bits")));
            }
        }
        if self.timeout_ms == 0 {
            return Err(invalid("bus.timeout_ms must be positive"));
        }
        Ok(())
    }
}

/// Co-processor serial link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial device path.
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Write timeout [ms].
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: IO_TIMEOUT_MS,
        }
    }
}

impl SerialConfig {
    /// Write timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port.is_empty() {
            return Err(invalid("serial.port cannot be empty"));
        }
        if self.baud_rate == 0 {
            return Err(invalid("serial.baud_rate must be positive"));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("serial.timeout_ms must be positive"));
        }
        Ok(())
    }
}

/// Valve input and status LED pins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    /// Valve feedback input pins.
    pub valve_pins: [u8; VALVE_COUNT],
    /// Valve states published at startup and substituted on a failed pin read.
    pub initial_valve_states: [bool; VALVE_COUNT],
    /// Ready (green) LED pin.
    pub ready_pin: u8,
    /// Error (red) LED pin.
    pub error_pin: u8,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            valve_pins: VALVE_PINS,
            initial_valve_states: [true; VALVE_COUNT],
            ready_pin: READY_LED_PIN,
            error_pin: ERROR_LED_PIN,
        }
    }
}

impl GpioConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for pin in self
            .valve_pins
            .iter()
            .chain([&self.ready_pin, &self.error_pin])
        {
            if !seen.insert(*pin) {
                return Err(invalid(format!("gpio pin {pin} assigned twice")));
            }
        }
        Ok(())
    }
}

/// DAC channel addresses per sensor group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMap {
    /// Pressure channels on DAC0.
    pub pressure: [u8; PRESSURE_COUNT],
    /// Thermistor channels; 0-3 on DAC0, 4 on DAC1.
    pub thermistor: [u8; THERMISTOR_COUNT],
    /// Mass-spec channels on DAC1.
    pub mass_spec: [u8; MASS_SPEC_COUNT],
    /// IR flow channels on DAC1.
    pub ir: [u8; IR_FLOW_COUNT],
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            pressure: PRESSURE_CHANNELS,
            thermistor: THERMISTOR_CHANNELS,
            mass_spec: MASS_SPEC_CHANNELS,
            ir: IR_CHANNELS,
        }
    }
}

impl ChannelMap {
    /// Channel addresses written to DAC0, in frame order.
    pub fn dac0(&self) -> impl Iterator<Item = u8> + '_ {
        self.pressure.iter().chain(&self.thermistor[..4]).copied()
    }

    /// Channel addresses written to DAC1, in frame order.
    pub fn dac1(&self) -> impl Iterator<Item = u8> + '_ {
        self.mass_spec
            .iter()
            .chain(&self.ir)
            .chain(&self.thermistor[4..])
            .copied()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let devices = [
            ("DAC0", self.dac0().collect::<Vec<_>>()),
            ("DAC1", self.dac1().collect()),
        ];
        for (device, channels) in devices {
            let mut seen = HashSet::new();
            for ch in channels {
                if ch > DAC_CHANNEL_MAX {
                    return Err(invalid(format!(
                        "{device} channel {ch:#x} exceeds {DAC_CHANNEL_MAX:#x}"
                    )));
                }
                if !seen.insert(ch) {
                    return Err(invalid(format!("{device} channel {ch:#x} assigned twice")));
                }
            }
        }
        Ok(())
    }
}

/// Per-group calibration tables. Missing trailing entries use identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Pressure calibrations, index-aligned with the pressure group.
    pub pressure: Vec<CalibrationFunction>,
    /// Thermistor calibrations, index-aligned with the thermistor group.
    pub thermistor: Vec<CalibrationFunction>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            pressure: vec![
                CalibrationFunction::linear(0.2698, 0.1013),
                CalibrationFunction::linear(0.2462, 0.4404),
                CalibrationFunction::linear(0.2602, 0.1049),
                CalibrationFunction::Neutral,
            ],
            thermistor: vec![CalibrationFunction::Neutral; THERMISTOR_COUNT],
        }
    }
}

impl CalibrationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.pressure.len() > PRESSURE_COUNT {
            return Err(invalid(format!(
                "calibration.pressure has {} entries, at most {PRESSURE_COUNT} channels exist",
                self.pressure.len()
            )));
        }
        if self.thermistor.len() > THERMISTOR_COUNT {
            return Err(invalid(format!(
                "calibration.thermistor has {} entries, at most {THERMISTOR_COUNT} channels exist",
                self.thermistor.len()
            )));
        }
        Ok(())
    }
}

/// Wire encoding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// DAC reference voltage [V].
    pub dac_vref: f64,
    /// UV counts per unit.
    pub uv_scale: f64,
    /// Error-state byte closing every digital frame.
    pub error_state: u8,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            dac_vref: DAC_VREF,
            uv_scale: UV_SCALE,
            error_state: ERROR_STATE,
        }
    }
}

impl CodecConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dac_vref.is_finite() && self.dac_vref > 0.0) {
            return Err(invalid(format!("codec.dac_vref {} must be > 0", self.dac_vref)));
        }
        if !(self.uv_scale.is_finite() && self.uv_scale > 0.0) {
            return Err(invalid(format!("codec.uv_scale {} must be > 0", self.uv_scale)));
        }
        Ok(())
    }
}

/// Noise transform applied to every sensor value before calibration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FuzzConfig {
    /// No noise.
    #[default]
    None,
    /// Uniform noise in `[-amplitude, amplitude]`.
    Uniform {
        /// Half-width of the noise band.
        amplitude: f64,
        /// RNG seed, for reproducible runs.
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl FuzzConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Self::Uniform { amplitude, .. } = self {
            if !(amplitude.is_finite() && *amplitude >= 0.0) {
                return Err(invalid(format!("fuzz.amplitude {amplitude} must be >= 0")));
            }
        }
        Ok(())
    }
}

/// Stand-in producers for mass-spec and UV readings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Nominal mass-spec outputs [V].
    pub mass_spec: [f64; MASS_SPEC_COUNT],
    /// Nominal UV band readings (A, B, C1, C2, D).
    pub uv: [f64; UV_BAND_COUNT],
    /// Relative random variation around the nominal values.
    pub jitter: f64,
    /// RNG seed, for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            mass_spec: [1.0, 0.5],
            uv: [12.0, 8.0, 0.4, 0.3, 5.0],
            jitter: 0.05,
            seed: None,
        }
    }
}

impl ProducerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.jitter.is_finite() && (0.0..=1.0).contains(&self.jitter)) {
            return Err(invalid(format!(
                "producers.jitter {} out of range [0, 1]",
                self.jitter
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);
    }

    #[test]
    fn empty_file_is_the_bench_setup() {
        let config = SimboxConfig::from_toml("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.cycle.frequency_hz, 20.0);
        assert_eq!(config.cycle.period(), Duration::from_millis(50));
        assert_eq!(config.bus.dac0_address, 0x28);
        assert_eq!(config.bus.dac1_address, 0x29);
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.gpio.valve_pins, [4, 14, 15, 17, 18, 27]);
        assert_eq!(config.shm.sensor_region, "sensors");
        assert_eq!(config.calibration.pressure.len(), 4);
        assert!(matches!(config.fuzz, FuzzConfig::None));
    }

    #[test]
    fn channel_map_frame_order() {
        let map = ChannelMap::default();
        assert_eq!(map.dac0().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(map.dac1().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = SimboxConfig::from_toml(
            r#"
            [loop]
            frequency_hz = 50.0

            [fuzz]
            kind = "uniform"
            amplitude = 0.01
            seed = 7
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.cycle.frequency_hz, 50.0);
        assert_eq!(config.cycle.rt_priority, 80);
        assert!(matches!(
            config.fuzz,
            FuzzConfig::Uniform { amplitude, seed: Some(7) } if amplitude == 0.01
        ));
    }

    #[test]
    fn rejects_out_of_range_frequency() {
        let config = SimboxConfig::from_toml("[loop]\nfrequency_hz = 0.0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn rejects_duplicate_pins() {
        let mut config = SimboxConfig::default();
        config.gpio.ready_pin = config.gpio.valve_pins[2];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("assigned twice"));
    }

    #[test]
    fn rejects_shared_dac_address() {
        let mut config = SimboxConfig::default();
        config.bus.dac1_address = config.bus.dac0_address;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_channel_on_one_device() {
        let mut config = SimboxConfig::default();
        config.channels.thermistor[1] = config.channels.pressure[0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_excess_calibrations() {
        let mut config = SimboxConfig::default();
        config.calibration.pressure.push(CalibrationFunction::Identity);
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [shared]
            service_name = "bench-a"
            log_level = "debug"

            [serial]
            port = "/dev/ttyUSB1"
            "#
        )
        .unwrap();

        let config = SimboxConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.service_name, "bench-a");
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
    }

    #[test]
    fn missing_file_is_reported() {
        let result = SimboxConfig::load(Path::new("/nonexistent/simbox.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let result = SimboxConfig::from_toml("[loop\nfrequency_hz = ");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
