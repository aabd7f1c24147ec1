//! System-wide constants for the simbox workspace.
//!
//! Single source of truth for vector sizes, frame lengths, bus addresses and
//! the default channel map. Imported by all crates.

use static_assertions::const_assert_eq;

// ─── Loop ───────────────────────────────────────────────────────────

/// Default control loop frequency [Hz].
pub const FREQUENCY_HZ: f64 = 20.0;

/// Lowest accepted loop frequency [Hz].
pub const FREQUENCY_HZ_MIN: f64 = 0.1;

/// Highest accepted loop frequency [Hz].
pub const FREQUENCY_HZ_MAX: f64 = 1000.0;

/// Error-state byte appended to every digital frame.
pub const ERROR_STATE: u8 = 0;

// ─── Shared State Vectors ───────────────────────────────────────────

/// Number of sensor channels in a `SensorVector`.
pub const SENSOR_COUNT: usize = 15;

/// Number of monitored valve inputs in a `ValveStateVector`.
pub const VALVE_COUNT: usize = 6;

/// Payload size of the sensor region: 15 × f64.
pub const SENSOR_REGION_BYTES: usize = SENSOR_COUNT * core::mem::size_of::<f64>();

/// Payload size of the valve region: one byte per valve.
pub const VALVE_REGION_BYTES: usize = VALVE_COUNT;

const_assert_eq!(SENSOR_REGION_BYTES, 120);
const_assert_eq!(VALVE_REGION_BYTES, 6);

/// Default name of the sensor region.
pub const SENSOR_REGION_NAME: &str = "sensors";

/// Default name of the valve region.
pub const VALVE_REGION_NAME: &str = "valves";

/// Default directory holding the shared memory regions.
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

// ─── Sensor Index Layout ────────────────────────────────────────────

/// Number of pressure channels.
pub const PRESSURE_COUNT: usize = 4;
/// Number of thermistor channels.
pub const THERMISTOR_COUNT: usize = 5;
/// Number of digital flow channels (and digital temperature channels).
pub const DIGITAL_FLOW_COUNT: usize = 2;
/// Number of IR flow channels.
pub const IR_FLOW_COUNT: usize = 2;
/// Number of mass-spec readings per tick.
pub const MASS_SPEC_COUNT: usize = 2;
/// Number of UV bands per tick (A, B, C1, C2, D).
pub const UV_BAND_COUNT: usize = 5;

/// First pressure index.
pub const PRESSURE_BASE: usize = 0;
/// First thermistor index.
pub const THERMISTOR_BASE: usize = PRESSURE_BASE + PRESSURE_COUNT;
/// First digital flow index.
pub const DIGITAL_FLOW_BASE: usize = THERMISTOR_BASE + THERMISTOR_COUNT;
/// First digital temperature index.
pub const DIGITAL_TEMP_BASE: usize = DIGITAL_FLOW_BASE + DIGITAL_FLOW_COUNT;
/// First IR flow index.
pub const IR_FLOW_BASE: usize = DIGITAL_TEMP_BASE + DIGITAL_FLOW_COUNT;

const_assert_eq!(IR_FLOW_BASE + IR_FLOW_COUNT, SENSOR_COUNT);

// ─── DAC Bus ────────────────────────────────────────────────────────

/// DAC0 bus address (pressure sensors, thermistors 0-3).
pub const DAC0_ADDRESS: u16 = 0x28;
/// DAC1 bus address (mass spec, IR flow, thermistor 4).
pub const DAC1_ADDRESS: u16 = 0x29;

/// Default I2C bus number.
pub const DEFAULT_I2C_BUS: u8 = 1;

/// Pressure channel addresses on DAC0.
pub const PRESSURE_CHANNELS: [u8; PRESSURE_COUNT] = [0x0, 0x1, 0x2, 0x3];
/// Thermistor channel addresses. Entries 0-3 live on DAC0, entry 4 on DAC1.
pub const THERMISTOR_CHANNELS: [u8; THERMISTOR_COUNT] = [0x4, 0x5, 0x6, 0x7, 0x4];
/// Mass-spec channel addresses on DAC1.
pub const MASS_SPEC_CHANNELS: [u8; MASS_SPEC_COUNT] = [0x0, 0x1];
/// IR flow channel addresses on DAC1.
pub const IR_CHANNELS: [u8; IR_FLOW_COUNT] = [0x2, 0x3];

/// Number of thermistors routed to DAC0.
pub const DAC0_THERMISTORS: usize = 4;

/// Channel/value pairs written to DAC0.
pub const DAC0_PAIRS: usize = PRESSURE_COUNT + DAC0_THERMISTORS;
/// Channel/value pairs written to DAC1.
pub const DAC1_PAIRS: usize =
    MASS_SPEC_COUNT + IR_FLOW_COUNT + (THERMISTOR_COUNT - DAC0_THERMISTORS);

/// DAC0 frame length in bytes.
pub const DAC0_FRAME_LEN: usize = 2 * DAC0_PAIRS;
/// DAC1 frame length in bytes.
pub const DAC1_FRAME_LEN: usize = 2 * DAC1_PAIRS;

const_assert_eq!(DAC0_FRAME_LEN, 16);
const_assert_eq!(DAC1_FRAME_LEN, 10);

/// Default DAC reference voltage [V].
pub const DAC_VREF: f64 = 3.3;

/// Largest DAC value code.
pub const DAC_CODE_MAX: u8 = u8::MAX;

// ─── Serial Link ────────────────────────────────────────────────────

/// Default co-processor serial device.
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";
/// Default co-processor baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Encoded length of one flow channel.
pub const FLOW_ENCODING_LEN: usize = 9;
/// Encoded length of the UV bands.
pub const UV_ENCODING_LEN: usize = 10;
/// Digital frame length: two flow encodings, UV encoding, error byte.
pub const DIGITAL_FRAME_LEN: usize = 2 * FLOW_ENCODING_LEN + UV_ENCODING_LEN + 1;

const_assert_eq!(DIGITAL_FRAME_LEN, 29);

/// Default UV scale factor (counts per unit).
pub const UV_SCALE: f64 = 100.0;

/// Default write timeout for bus and serial writes [ms].
pub const IO_TIMEOUT_MS: u64 = 10;

// ─── GPIO ───────────────────────────────────────────────────────────

/// Valve feedback input pins (BCM numbering).
pub const VALVE_PINS: [u8; VALVE_COUNT] = [4, 14, 15, 17, 18, 27];
/// Red status LED (error).
pub const ERROR_LED_PIN: u8 = 21;
/// Green status LED (ready).
pub const READY_LED_PIN: u8 = 13;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/simbox/config.toml";
