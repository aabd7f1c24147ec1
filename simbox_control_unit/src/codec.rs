//! Channel codec: physical values to the bytes expected on the wire.
//!
//! Everything here is pure. The cycle engine hands in calibrated values and
//! gets back fixed-size frames:
//!
//! | Frame   | Target       | Layout                                            |
//! |---------|--------------|---------------------------------------------------|
//! | DAC0    | bus `0x28`   | `(ch, code)` × 8: P0..P3, T0..T3                  |
//! | DAC1    | bus `0x29`   | `(ch, code)` × 5: MS0, MS1, IR0, IR1, T4          |
//! | Digital | serial link  | flow0 (9) + flow1 (9) + UV (10) + error state (1) |

use bitflags::bitflags;
use simbox_common::config::{ChannelMap, CodecConfig};
use simbox_common::consts::{
    DAC_CODE_MAX, DAC0_FRAME_LEN, DAC0_PAIRS, DAC0_THERMISTORS, DAC1_FRAME_LEN, DAC1_PAIRS,
    DIGITAL_FLOW_COUNT, DIGITAL_FRAME_LEN, FLOW_ENCODING_LEN, IR_FLOW_COUNT, MASS_SPEC_COUNT,
    PRESSURE_COUNT, THERMISTOR_COUNT, UV_BAND_COUNT, UV_ENCODING_LEN,
};
use simbox_common::sensors::{ChannelGroup, SensorVector};
use static_assertions::const_assert_eq;

const_assert_eq!(DAC0_PAIRS, PRESSURE_COUNT + DAC0_THERMISTORS);
const_assert_eq!(
    DAC1_PAIRS,
    MASS_SPEC_COUNT + IR_FLOW_COUNT + THERMISTOR_COUNT - DAC0_THERMISTORS
);
const_assert_eq!(DAC0_FRAME_LEN, 16);
const_assert_eq!(DAC1_FRAME_LEN, 10);
const_assert_eq!(DIGITAL_FRAME_LEN, 29);

/// Interleaved `(channel address, value code)` bytes for one DAC.
///
/// Capacity is the larger DAC0 frame; DAC1 frames use the first 10 bytes.
pub type AnalogFrame = heapless::Vec<u8, DAC0_FRAME_LEN>;

/// Bytes sent to the co-processor each tick.
pub type DigitalFrame = [u8; DIGITAL_FRAME_LEN];

// ─── DAC quantization ───────────────────────────────────────────────

/// Voltage to 8-bit DAC code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DacCodec {
    vref: f64,
}

impl DacCodec {
    /// Codec for a DAC with reference voltage `vref`.
    pub const fn new(vref: f64) -> Self {
        Self { vref }
    }

    /// Reference voltage.
    pub const fn vref(&self) -> f64 {
        self.vref
    }

    /// `floor(clamp(volts / vref, 0, 1) * 255)`. Non-finite input gives 0.
    #[inline]
    pub fn code(&self, volts: f64) -> u8 {
        let ratio = volts / self.vref;
        if !ratio.is_finite() {
            return 0;
        }
        (ratio.clamp(0.0, 1.0) * f64::from(DAC_CODE_MAX)).floor() as u8
    }
}

// ─── Co-processor encodings ─────────────────────────────────────────

bitflags! {
    /// Status byte closing a flow encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FlowStatus: u8 {
        /// Flow value was not finite and was sent as 0.0.
        const FLOW_INVALID = 0x01;
        /// Temperature value was not finite and was sent as 0.0.
        const TEMP_INVALID = 0x02;
    }
}

/// Encoding of one digital flow meter (flow and temperature).
pub trait FlowEncoding: Send {
    /// Encode one flow meter reading.
    fn encode_flow(&self, flow: f64, temperature: f64) -> [u8; FLOW_ENCODING_LEN];
}

/// Encoding of the five UV bands.
pub trait UvEncoding: Send {
    /// Encode bands A, B, C1, C2, D.
    fn encode_uv(&self, bands: &[f64; UV_BAND_COUNT]) -> [u8; UV_ENCODING_LEN];
}

/// `f32` LE flow, `f32` LE temperature, then a [`FlowStatus`] byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatFlowEncoding;

impl FlowEncoding for FloatFlowEncoding {
    fn encode_flow(&self, flow: f64, temperature: f64) -> [u8; FLOW_ENCODING_LEN] {
        let mut status = FlowStatus::empty();
        let mut checked = |value: f64, flag: FlowStatus| -> f32 {
            let narrowed = value as f32;
            if narrowed.is_finite() {
                narrowed
            } else {
                status |= flag;
                0.0
            }
        };
        let flow = checked(flow, FlowStatus::FLOW_INVALID);
        let temperature = checked(temperature, FlowStatus::TEMP_INVALID);

        let mut out = [0u8; FLOW_ENCODING_LEN];
        out[0..4].copy_from_slice(&flow.to_le_bytes());
        out[4..8].copy_from_slice(&temperature.to_le_bytes());
        out[8] = status.bits();
        out
    }
}

/// Each band as `u16` BE of `round(clamp(value * scale, 0, 65535))`.
#[derive(Debug, Clone, Copy)]
pub struct ScaledUvEncoding {
    scale: f64,
}

impl ScaledUvEncoding {
    /// Encoding with `scale` counts per unit.
    pub const fn new(scale: f64) -> Self {
        Self { scale }
    }
}

impl UvEncoding for ScaledUvEncoding {
    fn encode_uv(&self, bands: &[f64; UV_BAND_COUNT]) -> [u8; UV_ENCODING_LEN] {
        let mut out = [0u8; UV_ENCODING_LEN];
        for (chunk, band) in out.chunks_exact_mut(2).zip(bands) {
            let scaled = band * self.scale;
            let counts = if scaled.is_finite() {
                scaled.clamp(0.0, f64::from(u16::MAX)).round() as u16
            } else {
                0
            };
            chunk.copy_from_slice(&counts.to_be_bytes());
        }
        out
    }
}

// ─── Frame assembly ─────────────────────────────────────────────────

/// Builds the three per-tick frames.
pub struct ChannelCodec {
    dac: DacCodec,
    flow: Box<dyn FlowEncoding>,
    uv: Box<dyn UvEncoding>,
    error_state: u8,
}

impl ChannelCodec {
    /// Codec with the default encodings.
    pub fn from_config(config: &CodecConfig) -> Self {
        Self::with_encodings(
            config,
            Box::new(FloatFlowEncoding),
            Box::new(ScaledUvEncoding::new(config.uv_scale)),
        )
    }

    /// Codec with caller-supplied co-processor encodings.
    pub fn with_encodings(
        config: &CodecConfig,
        flow: Box<dyn FlowEncoding>,
        uv: Box<dyn UvEncoding>,
    ) -> Self {
        Self {
            dac: DacCodec::new(config.dac_vref),
            flow,
            uv,
            error_state: config.error_state,
        }
    }

    /// DAC quantizer in use.
    pub fn dac(&self) -> DacCodec {
        self.dac
    }

    fn analog_frame(
        &self,
        channels: impl Iterator<Item = u8>,
        values: impl Iterator<Item = f64>,
    ) -> AnalogFrame {
        let mut frame = AnalogFrame::new();
        // Pair counts are fixed by the channel map types and asserted above.
        frame.extend(
            channels
                .zip(values)
                .flat_map(|(ch, v)| [ch, self.dac.code(v)]),
        );
        frame
    }

    /// DAC0: pressure 0-3, then thermistors 0-3.
    pub fn build_dac0(&self, map: &ChannelMap, calibrated: &SensorVector) -> AnalogFrame {
        let values = calibrated
            .group(ChannelGroup::Pressure)
            .iter()
            .chain(&calibrated.group(ChannelGroup::Thermistor)[..DAC0_THERMISTORS])
            .copied();
        self.analog_frame(map.dac0(), values)
    }

    /// DAC1: mass spec 0-1, IR flow 0-1, then thermistor 4.
    pub fn build_dac1(
        &self,
        map: &ChannelMap,
        calibrated: &SensorVector,
        mass_spec: &[f64; MASS_SPEC_COUNT],
    ) -> AnalogFrame {
        let values = mass_spec
            .iter()
            .chain(calibrated.group(ChannelGroup::IrFlow))
            .chain(&calibrated.group(ChannelGroup::Thermistor)[DAC0_THERMISTORS..])
            .copied();
        self.analog_frame(map.dac1(), values)
    }

    /// Flow meter 0, flow meter 1, UV bands, error state.
    pub fn build_digital(
        &self,
        sensors: &SensorVector,
        uv: &[f64; UV_BAND_COUNT],
    ) -> DigitalFrame {
        let flow = sensors.group(ChannelGroup::DigitalFlow);
        let temp = sensors.group(ChannelGroup::DigitalTemp);

        let mut frame = [0u8; DIGITAL_FRAME_LEN];
        let mut offset = 0;
        for meter in 0..DIGITAL_FLOW_COUNT {
            let encoded = self.flow.encode_flow(flow[meter], temp[meter]);
            frame[offset..offset + FLOW_ENCODING_LEN].copy_from_slice(&encoded);
            offset += FLOW_ENCODING_LEN;
        }
        frame[offset..offset + UV_ENCODING_LEN].copy_from_slice(&self.uv.encode_uv(uv));
        offset += UV_ENCODING_LEN;
        frame[offset] = self.error_state;
        frame
    }
}
