//! Small value types shared between drivers and the control loop.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary status outputs driven by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLed {
    /// Green LED, lit once the loop is running.
    Ready,
    /// Red LED, lit while output writes are failing.
    Error,
}

impl StatusLed {
    /// Both indicators.
    pub const ALL: [StatusLed; 2] = [Self::Ready, Self::Error];
}

impl fmt::Display for StatusLed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Output device addressed by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    /// First DAC (pressure, thermistors 0-3).
    Dac0,
    /// Second DAC (mass spec, IR flow, thermistor 4).
    Dac1,
    /// Co-processor serial link.
    Serial,
}

impl OutputTarget {
    /// All targets in write order.
    pub const ALL: [OutputTarget; 3] = [Self::Dac0, Self::Dac1, Self::Serial];

    /// Position in [`OutputTarget::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Self::Dac0 => 0,
            Self::Dac1 => 1,
            Self::Serial => 2,
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dac0 => write!(f, "dac0"),
            Self::Dac1 => write!(f, "dac1"),
            Self::Serial => write!(f, "serial"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_indices_follow_write_order() {
        for (i, target) in OutputTarget::ALL.iter().enumerate() {
            assert_eq!(target.index(), i);
        }
        assert_eq!(OutputTarget::Serial.to_string(), "serial");
    }
}
