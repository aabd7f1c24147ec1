//! Noise injected into sensor values before calibration.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simbox_common::config::FuzzConfig;
use simbox_common::sensors::SensorVector;

/// Fuzz transform applied to every element of the sensor snapshot.
#[derive(Debug, Clone, Default)]
pub enum FuzzModel {
    /// Values pass through unchanged.
    #[default]
    None,
    /// Adds uniform noise in `[-amplitude, amplitude]`.
    Uniform {
        /// Half-width of the noise band.
        amplitude: f64,
        /// Noise source.
        rng: StdRng,
    },
}

impl FuzzModel {
    /// Build from configuration. An unseeded model draws from OS entropy.
    pub fn from_config(config: &FuzzConfig) -> Self {
        match *config {
            FuzzConfig::None => Self::None,
            FuzzConfig::Uniform { amplitude, seed } => Self::Uniform {
                amplitude,
                rng: match seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                },
            },
        }
    }

    /// Perturb every element in place.
    pub fn apply(&mut self, sensors: &mut SensorVector) {
        match self {
            Self::None => {}
            Self::Uniform { amplitude, rng } => {
                if *amplitude == 0.0 {
                    return;
                }
                for value in sensors.as_mut_slice() {
                    *value += rng.gen_range(-*amplitude..=*amplitude);
                }
            }
        }
    }
}
