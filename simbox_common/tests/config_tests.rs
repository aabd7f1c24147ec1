//! Configuration file tests.
//!
//! Exercises `SimboxConfig` loading from disk: bench defaults, calibration
//! tables, pin overrides and validation failures.

use simbox_common::calibration::CalibrationFunction;
use simbox_common::config::{ConfigError, ConfigLoader, FuzzConfig, LogLevel, SimboxConfig};
use std::fs;
use tempfile::TempDir;

fn load(content: &str) -> Result<SimboxConfig, ConfigError> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, content).unwrap();
    SimboxConfig::load(&path)
}

#[test]
fn full_bench_file_round_trips() {
    let config = load(
        r#"
[shared]
service_name = "simbox-bench"
log_level = "trace"

[loop]
frequency_hz = 20.0
rt_priority = 70
cpu_core = 3

[shm]
dir = "/tmp/simbox-test"
sensor_region = "sensors"
valve_region = "valves"
replace_stale = false

[bus]
i2c_bus = 1
dac0_address = 0x28
dac1_address = 0x29

[serial]
port = "/dev/ttyACM0"
baud_rate = 115200

[gpio]
valve_pins = [4, 14, 15, 17, 18, 27]
initial_valve_states = [true, true, false, true, true, true]
ready_pin = 13
error_pin = 21

[calibration]
pressure = [
    { kind = "linear", gain = 0.2698, offset = 0.1013 },
    { kind = "linear", gain = 0.2462, offset = 0.4404 },
]
thermistor = [{ kind = "polynomial", coefficients = [0.5, 0.01] }]

[codec]
dac_vref = 5.0
error_state = 3

[fuzz]
kind = "uniform"
amplitude = 0.002

[producers]
jitter = 0.0
seed = 42
"#,
    )
    .unwrap();

    config.validate().unwrap();
    assert_eq!(config.shared.log_level, LogLevel::Trace);
    assert_eq!(config.cycle.cpu_core, 3);
    assert!(!config.shm.replace_stale);
    assert_eq!(config.shm.dir.to_str(), Some("/tmp/simbox-test"));
    assert!(!config.gpio.initial_valve_states[2]);
    assert_eq!(config.calibration.pressure.len(), 2);
    assert!((config.calibration.pressure[0].apply(1.0) - 0.3711).abs() < 1e-12);
    assert_eq!(config.calibration.thermistor[0].apply(100.0), 1.5);
    assert_eq!(config.codec.error_state, 3);
    assert!(matches!(config.fuzz, FuzzConfig::Uniform { seed: None, .. }));
    assert_eq!(config.producers.seed, Some(42));
}

#[test]
fn default_calibration_matches_bench() {
    let config = load("").unwrap();
    let expected = [0.3711, 0.6866, 0.3651, 0.0];
    for (cal, want) in config.calibration.pressure.iter().zip(expected) {
        assert!((cal.apply(1.0) - want).abs() < 1e-12, "{}", cal.describe());
    }
    assert!(
        config
            .calibration
            .thermistor
            .iter()
            .all(|c| matches!(c, CalibrationFunction::Neutral))
    );
}

#[test]
fn unknown_calibration_kind_is_rejected() {
    let result = load("[calibration]\npressure = [{ kind = \"spline\" }]\n");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn wrong_valve_pin_count_is_rejected() {
    let result = load("[gpio]\nvalve_pins = [4, 14, 15]\n");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn validation_catches_bad_values() {
    let cases = [
        "[loop]\nfrequency_hz = 5000.0\n",
        "[shm]\nsensor_region = \"\"\n",
        "[shm]\nvalve_region = \"sensors\"\n",
        "[bus]\ndac1_address = 0x28\n",
        "[bus]\ndac0_address = 0x100\n",
        "[serial]\nbaud_rate = 0\n",
        "[gpio]\nerror_pin = 4\n",
        "[channels]\nmass_spec = [0, 9]\n",
        "[codec]\ndac_vref = 0.0\n",
        "[fuzz]\nkind = \"uniform\"\namplitude = -1.0\n",
        "[producers]\njitter = 2.0\n",
    ];

    for case in cases {
        let config = load(case).unwrap();
        assert!(
            matches!(config.validate(), Err(ConfigError::ValidationError(_))),
            "accepted: {case}"
        );
    }
}
