//! Calibration bank: per-channel inverse calibrations, bound at startup.

use simbox_common::calibration::CalibrationFunction;
use simbox_common::config::CalibrationConfig;
use simbox_common::consts::{PRESSURE_COUNT, THERMISTOR_COUNT};
use simbox_common::sensors::{ChannelGroup, SensorVector};
use tracing::debug;

/// Index-aligned calibration tables for the pressure and thermistor groups.
///
/// Channels without an entry (and every channel of the other groups) pass
/// through unchanged.
#[derive(Debug, Clone)]
pub struct CalibrationBank {
    pressure: [CalibrationFunction; PRESSURE_COUNT],
    thermistor: [CalibrationFunction; THERMISTOR_COUNT],
}

impl Default for CalibrationBank {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}

fn table<const N: usize>(entries: &[CalibrationFunction]) -> [CalibrationFunction; N] {
    std::array::from_fn(|i| entries.get(i).cloned().unwrap_or_default())
}

impl CalibrationBank {
    /// Bind the configured tables. Missing trailing entries become identity.
    pub fn from_config(config: &CalibrationConfig) -> Self {
        let bank = Self {
            pressure: table(&config.pressure),
            thermistor: table(&config.thermistor),
        };
        for (i, f) in bank.pressure.iter().enumerate() {
            debug!("calibration pressure[{}] = {}", i, f.describe());
        }
        for (i, f) in bank.thermistor.iter().enumerate() {
            debug!("calibration thermistor[{}] = {}", i, f.describe());
        }
        bank
    }

    /// Replace one channel's calibration.
    ///
    /// Returns `false` when the group has no such calibrated channel.
    pub fn set(
        &mut self,
        group: ChannelGroup,
        index: usize,
        function: CalibrationFunction,
    ) -> bool {
        match self.slot_mut(group, index) {
            Some(slot) => {
                *slot = function;
                true
            }
            None => false,
        }
    }

    /// Calibration bound to a channel, if any.
    pub fn function(&self, group: ChannelGroup, index: usize) -> Option<&CalibrationFunction> {
        match group {
            ChannelGroup::Pressure => self.pressure.get(index),
            ChannelGroup::Thermistor => self.thermistor.get(index),
            _ => None,
        }
    }

    fn slot_mut(&mut self, group: ChannelGroup, index: usize) -> Option<&mut CalibrationFunction> {
        match group {
            ChannelGroup::Pressure => self.pressure.get_mut(index),
            ChannelGroup::Thermistor => self.thermistor.get_mut(index),
            _ => None,
        }
    }

    /// Calibrate one raw value. Total: never fails, never non-finite for
    /// a bound function; unbound channels return `raw` as is.
    #[inline]
    pub fn calibrate(&self, group: ChannelGroup, index: usize, raw: f64) -> f64 {
        match self.function(group, index) {
            Some(f) => f.apply(raw),
            None => raw,
        }
    }

    /// Calibrate every channel of a vector in place.
    pub fn apply(&self, sensors: &mut SensorVector) {
        for group in [ChannelGroup::Pressure, ChannelGroup::Thermistor] {
            for (index, value) in sensors.group_mut(group).iter_mut().enumerate() {
                *value = self.calibrate(group, index, *value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bench_pressure_round_trip() {
        let bank = CalibrationBank::default();
        let y = bank.calibrate(ChannelGroup::Pressure, 0, 1.0);
        assert!((y - 0.3711).abs() < 1e-12);
    }

    #[test]
    fn unmapped_channels_are_neutral() {
        let bank = CalibrationBank::default();
        assert_eq!(bank.calibrate(ChannelGroup::Pressure, 3, 42.0), 0.0);
        assert_eq!(bank.calibrate(ChannelGroup::Thermistor, 4, 42.0), 0.0);
    }

    #[test]
    fn other_groups_and_out_of_range_pass_through() {
        let bank = CalibrationBank::default();
        assert_eq!(bank.calibrate(ChannelGroup::IrFlow, 0, 1.25), 1.25);
        assert_eq!(bank.calibrate(ChannelGroup::Pressure, 9, 1.25), 1.25);
    }

    #[test]
    fn short_tables_default_to_identity() {
        let config = CalibrationConfig {
            pressure: vec![CalibrationFunction::linear(2.0, 0.0)],
            thermistor: vec![],
        };
        let bank = CalibrationBank::from_config(&config);
        assert_eq!(bank.calibrate(ChannelGroup::Pressure, 0, 1.5), 3.0);
        assert_eq!(bank.calibrate(ChannelGroup::Pressure, 1, 1.5), 1.5);
        assert_eq!(bank.calibrate(ChannelGroup::Thermistor, 2, 1.5), 1.5);
    }

    #[test]
    fn custom_functions_plug_in() {
        let mut bank = CalibrationBank::default();
        assert!(bank.set(ChannelGroup::Thermistor, 1, CalibrationFunction::Custom(f64::sqrt)));
        assert!(!bank.set(ChannelGroup::DigitalFlow, 0, CalibrationFunction::Identity));

        assert_eq!(bank.calibrate(ChannelGroup::Thermistor, 1, 16.0), 4.0);
        // sqrt(-1) is NaN, which collapses to the neutral value
        assert_eq!(bank.calibrate(ChannelGroup::Thermistor, 1, -1.0), 0.0);
    }

    #[test]
    fn apply_touches_only_calibrated_groups() {
        let bank = CalibrationBank::default();
        let mut sensors = SensorVector::new([1.0; 15]);
        bank.apply(&mut sensors);

        assert!((sensors.0[0] - 0.3711).abs() < 1e-12);
        assert_eq!(sensors.group(ChannelGroup::Thermistor), &[0.0; 5]);
        assert_eq!(sensors.group(ChannelGroup::DigitalFlow), &[1.0; 2]);
        assert_eq!(sensors.group(ChannelGroup::IrFlow), &[1.0; 2]);
    }
}
