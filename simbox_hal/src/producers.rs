//! Per-tick readings that do not come from the shared sensor vector.
//!
//! The bench has no mass spectrometer or UV sensor wired up yet, so both
//! are produced by stand-ins that jitter around configured nominal values.
//! The control loop only sees the traits, so real sources can replace the
//! fakes without touching it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simbox_common::config::ProducerConfig;
use simbox_common::consts::{MASS_SPEC_COUNT, UV_BAND_COUNT};

/// Source of the two mass-spec output voltages.
pub trait MassSpecSource: Send {
    /// Readings for this tick.
    fn read_mass_spec(&mut self) -> [f64; MASS_SPEC_COUNT];
}

/// Source of the five UV band readings (A, B, C1, C2, D).
pub trait UvSource: Send {
    /// Readings for this tick.
    fn read_uv(&mut self) -> [f64; UV_BAND_COUNT];
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn jittered<const N: usize>(rng: &mut StdRng, nominal: &[f64; N], jitter: f64) -> [f64; N] {
    if jitter == 0.0 {
        return *nominal;
    }
    (*nominal).map(|v| v * (1.0 + rng.gen_range(-jitter..=jitter)))
}

/// Stand-in mass spectrometer.
pub struct FakeMassSpec {
    nominal: [f64; MASS_SPEC_COUNT],
    jitter: f64,
    rng: StdRng,
}

impl FakeMassSpec {
    /// Build from the producer configuration.
    pub fn from_config(config: &ProducerConfig) -> Self {
        Self {
            nominal: config.mass_spec,
            jitter: config.jitter,
            rng: rng_from(config.seed),
        }
    }

    /// Always returns `values`.
    pub fn constant(values: [f64; MASS_SPEC_COUNT]) -> Self {
        Self {
            nominal: values,
            jitter: 0.0,
            rng: StdRng::seed_from_u64(0),
        }
    }
}

impl MassSpecSource for FakeMassSpec {
    fn read_mass_spec(&mut self) -> [f64; MASS_SPEC_COUNT] {
        jittered(&mut self.rng, &self.nominal, self.jitter)
    }
}

/// Stand-in UV sensor.
pub struct FakeUv {
    nominal: [f64; UV_BAND_COUNT],
    jitter: f64,
    rng: StdRng,
}

impl FakeUv {
    /// Build from the producer configuration. The seed is offset so the UV
    /// stream differs from the mass-spec stream.
    pub fn from_config(config: &ProducerConfig) -> Self {
        Self {
            nominal: config.uv,
            jitter: config.jitter,
            rng: rng_from(config.seed.map(|s| s.wrapping_add(1))),
        }
    }

    /// Always returns `values`.
    pub fn constant(values: [f64; UV_BAND_COUNT]) -> Self {
        Self {
            nominal: values,
            jitter: 0.0,
            rng: StdRng::seed_from_u64(0),
        }
    }
}

impl UvSource for FakeUv {
    fn read_uv(&mut self) -> [f64; UV_BAND_COUNT] {
        jittered(&mut self.rng, &self.nominal, self.jitter)
    }
}
