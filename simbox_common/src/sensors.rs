//! Fixed-layout shared state vectors.
//!
//! `SensorVector` and `ValveStateVector` have a compile-time length, so no
//! reader or writer can ever produce a vector of the wrong size. Both convert
//! to and from the raw byte payload stored in the shared memory regions
//! (native endianness, same as the sampling process).

use serde::{Deserialize, Serialize};

use crate::consts::{
    DIGITAL_FLOW_BASE, DIGITAL_FLOW_COUNT, DIGITAL_TEMP_BASE, IR_FLOW_BASE, IR_FLOW_COUNT,
    PRESSURE_BASE, PRESSURE_COUNT, SENSOR_COUNT, SENSOR_REGION_BYTES, THERMISTOR_BASE,
    THERMISTOR_COUNT, VALVE_COUNT, VALVE_REGION_BYTES,
};

const F64_BYTES: usize = core::mem::size_of::<f64>();

/// Semantic group of a sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelGroup {
    /// Pressure transducers.
    Pressure,
    /// Thermistors.
    Thermistor,
    /// Digital flow meters.
    DigitalFlow,
    /// Temperature reported by the digital flow meters.
    DigitalTemp,
    /// IR flow sensors.
    IrFlow,
}

impl ChannelGroup {
    /// All groups in vector order.
    pub const ALL: [ChannelGroup; 5] = [
        Self::Pressure,
        Self::Thermistor,
        Self::DigitalFlow,
        Self::DigitalTemp,
        Self::IrFlow,
    ];

    /// First vector index of the group.
    pub const fn base(self) -> usize {
        match self {
            Self::Pressure => PRESSURE_BASE,
            Self::Thermistor => THERMISTOR_BASE,
            Self::DigitalFlow => DIGITAL_FLOW_BASE,
            Self::DigitalTemp => DIGITAL_TEMP_BASE,
            Self::IrFlow => IR_FLOW_BASE,
        }
    }

    /// Number of channels in the group.
    pub const fn len(self) -> usize {
        match self {
            Self::Pressure => PRESSURE_COUNT,
            Self::Thermistor => THERMISTOR_COUNT,
            Self::DigitalFlow | Self::DigitalTemp => DIGITAL_FLOW_COUNT,
            Self::IrFlow => IR_FLOW_COUNT,
        }
    }

    /// Group and in-group index for an absolute vector index.
    pub fn locate(index: usize) -> Option<(ChannelGroup, usize)> {
        Self::ALL.into_iter().find_map(|group| {
            let base = group.base();
            (index >= base && index < base + group.len()).then(|| (group, index - base))
        })
    }
}

/// Latest sensor measurements, 15 physical values in fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorVector(pub [f64; SENSOR_COUNT]);

impl Default for SensorVector {
    fn default() -> Self {
        Self([0.0; SENSOR_COUNT])
    }
}

impl SensorVector {
    /// Wrap a raw array.
    pub const fn new(values: [f64; SENSOR_COUNT]) -> Self {
        Self(values)
    }

    /// All values in vector order.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Mutable access to all values.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.0
    }

    /// Values of one channel group.
    #[inline]
    pub fn group(&self, group: ChannelGroup) -> &[f64] {
        &self.0[group.base()..group.base() + group.len()]
    }

    /// Mutable values of one channel group.
    #[inline]
    pub fn group_mut(&mut self, group: ChannelGroup) -> &mut [f64] {
        &mut self.0[group.base()..group.base() + group.len()]
    }

    /// Value of channel `index` within `group`, if it exists.
    #[inline]
    pub fn get(&self, group: ChannelGroup, index: usize) -> Option<f64> {
        self.group(group).get(index).copied()
    }

    /// Encode into the region payload.
    pub fn to_bytes(&self) -> [u8; SENSOR_REGION_BYTES] {
        let mut out = [0u8; SENSOR_REGION_BYTES];
        for (chunk, value) in out.chunks_exact_mut(F64_BYTES).zip(self.0.iter()) {
            chunk.copy_from_slice(&value.to_ne_bytes());
        }
        out
    }

    /// Decode from the region payload.
    pub fn from_bytes(bytes: &[u8; SENSOR_REGION_BYTES]) -> Self {
        let mut values = [0.0; SENSOR_COUNT];
        for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(F64_BYTES)) {
            let mut raw = [0u8; F64_BYTES];
            raw.copy_from_slice(chunk);
            *value = f64::from_ne_bytes(raw);
        }
        Self(values)
    }
}

/// Valve feedback pin levels, one per monitored digital input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValveStateVector(pub [bool; VALVE_COUNT]);

impl Default for ValveStateVector {
    fn default() -> Self {
        Self([true; VALVE_COUNT])
    }
}

impl ValveStateVector {
    /// Wrap a raw array.
    pub const fn new(states: [bool; VALVE_COUNT]) -> Self {
        Self(states)
    }

    /// All states in pin order.
    #[inline]
    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    /// Number of open (high) valves.
    pub fn count_high(&self) -> usize {
        self.0.iter().filter(|&&s| s).count()
    }

    /// Encode into the region payload (0 / 1 per valve).
    pub fn to_bytes(&self) -> [u8; VALVE_REGION_BYTES] {
        self.0.map(u8::from)
    }

    /// Decode from the region payload. Any non-zero byte reads as `true`.
    pub fn from_bytes(bytes: &[u8; VALVE_REGION_BYTES]) -> Self {
        Self(bytes.map(|b| b != 0))
    }
}
