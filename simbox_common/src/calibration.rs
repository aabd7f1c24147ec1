//! Per-channel inverse calibration functions (physical unit → output volts).
//!
//! A `CalibrationFunction` is bound once at startup and evaluated every tick.
//! Evaluation is total: it never fails and never yields a non-finite value.
//! A channel with no physical mapping evaluates to the neutral value `0.0`.
//!
//! # TOML Example
//!
//! ```toml
//! [calibration]
//! pressure = [
//!     { kind = "linear", gain = 0.2698, offset = 0.1013 },
//!     { kind = "polynomial", coefficients = [0.1, 0.25, 0.001] },
//!     { kind = "identity" },
//!     { kind = "neutral" },
//! ]
//! ```

use serde::{Deserialize, Serialize};

/// Value produced by a channel without a physical mapping.
pub const NEUTRAL_VALUE: f64 = 0.0;

/// A pure numeric transform applied to one channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationFunction {
    /// Pass the value through unchanged.
    #[default]
    Identity,
    /// No physical mapping; always `NEUTRAL_VALUE`.
    Neutral,
    /// `gain * x + offset`.
    Linear {
        /// Slope.
        gain: f64,
        /// Intercept.
        offset: f64,
    },
    /// `c0 + c1*x + c2*x^2 + ...` (ascending powers).
    Polynomial {
        /// Coefficients, constant term first.
        coefficients: Vec<f64>,
    },
    /// Arbitrary pure transform supplied in code.
    #[serde(skip)]
    Custom(fn(f64) -> f64),
}

impl CalibrationFunction {
    /// Shorthand for a linear calibration.
    pub const fn linear(gain: f64, offset: f64) -> Self {
        Self::Linear { gain, offset }
    }

    /// Evaluate the calibration. Non-finite results collapse to `NEUTRAL_VALUE`.
    #[inline]
    pub fn apply(&self, x: f64) -> f64 {
        let y = match self {
            Self::Identity => x,
            Self::Neutral => NEUTRAL_VALUE,
            Self::Linear { gain, offset } => gain * x + offset,
            Self::Polynomial { coefficients } => coefficients
                .iter()
                .rev()
                .fold(0.0, |acc, &c| acc * x + c),
            Self::Custom(f) => f(x),
        };
        if y.is_finite() { y } else { NEUTRAL_VALUE }
    }

    /// Short description used in startup logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Identity => "identity".to_string(),
            Self::Neutral => "neutral".to_string(),
            Self::Linear { gain, offset } => format!("{gain}x{offset:+}"),
            Self::Polynomial { coefficients } => format!("poly{coefficients:?}"),
            Self::Custom(_) => "custom".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_matches_bench_value() {
        let cal = CalibrationFunction::linear(0.2698, 0.1013);
        assert!((cal.apply(1.0) - 0.3711).abs() < 1e-12);
    }

    #[test]
    fn neutral_ignores_input() {
        assert_eq!(CalibrationFunction::Neutral.apply(123.0), 0.0);
        assert_eq!(CalibrationFunction::Neutral.apply(f64::NAN), 0.0);
    }

    #[test]
    fn identity_passes_through() {
        assert_eq!(CalibrationFunction::Identity.apply(-4.25), -4.25);
    }

    #[test]
    fn polynomial_uses_ascending_powers() {
        let cal = CalibrationFunction::Polynomial {
            coefficients: vec![1.0, 2.0, 3.0],
        };
        // 1 + 2*2 + 3*4
        assert_eq!(cal.apply(2.0), 17.0);

        let empty = CalibrationFunction::Polynomial {
            coefficients: vec![],
        };
        assert_eq!(empty.apply(5.0), 0.0);
    }

    #[test]
    fn custom_transform() {
        fn square(x: f64) -> f64 {
            x * x
        }
        assert_eq!(CalibrationFunction::Custom(square).apply(3.0), 9.0);
    }

    #[test]
    fn non_finite_results_are_neutral() {
        assert_eq!(CalibrationFunction::Identity.apply(f64::INFINITY), 0.0);
        assert_eq!(CalibrationFunction::linear(f64::MAX, 0.0).apply(10.0), 0.0);
    }

    #[test]
    fn deserializes_tagged_variants() {
        #[derive(Deserialize)]
        struct Wrapper {
            cals: Vec<CalibrationFunction>,
        }

        let w: Wrapper = toml::from_str(
            r#"
            cals = [
                { kind = "linear", gain = 2.0, offset = 1.0 },
                { kind = "neutral" },
                { kind = "identity" },
                { kind = "polynomial", coefficients = [0.0, 1.0] },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(w.cals.len(), 4);
        assert_eq!(w.cals[0].apply(1.0), 3.0);
        assert_eq!(w.cals[1].apply(1.0), 0.0);
        assert_eq!(w.cals[2].apply(1.0), 1.0);
        assert_eq!(w.cals[3].apply(7.0), 7.0);
    }
}
