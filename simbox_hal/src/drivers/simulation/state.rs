//! Shared simulation state and fault injection.

use parking_lot::Mutex;
use simbox_common::hal::driver::DriverDiagnostics;
use simbox_common::hal::types::StatusLed;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Frames kept per device before the oldest is dropped.
const HISTORY_LEN: usize = 256;

/// A place where a fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// DAC at a bus address.
    Dac(u16),
    /// Serial link.
    Serial,
    /// Input pin.
    Pin(u8),
    /// Status LED.
    Status(StatusLed),
}

/// Injected misbehaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail the next operation, then recover.
    FailOnce,
    /// Fail every operation until cleared.
    FailAlways,
    /// Take this long; writes longer than their timeout fail with `Timeout`.
    Delay(Duration),
}

/// Recorded peripheral state.
#[derive(Debug, Default)]
pub struct SimState {
    /// Frames written per DAC address, oldest first.
    pub dac_frames: HashMap<u16, VecDeque<Vec<u8>>>,
    /// Frames written to the serial link, oldest first.
    pub serial_frames: VecDeque<Vec<u8>>,
    /// Input pin levels.
    pub inputs: HashMap<u8, bool>,
    /// Status LED levels.
    pub leds: HashMap<StatusLed, bool>,
    /// Active faults.
    pub faults: HashMap<FaultPoint, Fault>,
    /// Operation counters.
    pub diagnostics: DriverDiagnostics,
}

impl SimState {
    pub(crate) fn take_fault(&mut self, point: FaultPoint) -> Option<Fault> {
        match self.faults.get(&point).copied() {
            Some(Fault::FailOnce) => self.faults.remove(&point),
            other => other,
        }
    }

    pub(crate) fn record_dac(&mut self, address: u16, frame: &[u8]) {
        let history = self.dac_frames.entry(address).or_default();
        if history.len() == HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(frame.to_vec());
        self.diagnostics.bus_writes += 1;
    }

    pub(crate) fn record_serial(&mut self, frame: &[u8]) {
        if self.serial_frames.len() == HISTORY_LEN {
            self.serial_frames.pop_front();
        }
        self.serial_frames.push_back(frame.to_vec());
        self.diagnostics.serial_writes += 1;
    }
}

/// Cloneable handle to the state behind a [`SimulationDriver`].
///
/// [`SimulationDriver`]: super::SimulationDriver
#[derive(Debug, Clone, Default)]
pub struct SimHandle(Arc<Mutex<SimState>>);

impl SimHandle {
    /// Fresh state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a fault, replacing any previous one at the same point.
    pub fn inject(&self, point: FaultPoint, fault: Fault) {
        self.0.lock().faults.insert(point, fault);
    }

    /// Remove all faults.
    pub fn clear_faults(&self) {
        self.0.lock().faults.clear();
    }

    /// Drive an input pin.
    pub fn set_input(&self, pin: u8, level: bool) {
        self.0.lock().inputs.insert(pin, level);
    }

    /// Level of a status LED (off if never set).
    pub fn led(&self, led: StatusLed) -> bool {
        self.0.lock().leds.get(&led).copied().unwrap_or(false)
    }

    /// All frames written to a DAC, oldest first.
    pub fn dac_frames(&self, address: u16) -> Vec<Vec<u8>> {
        self.0
            .lock()
            .dac_frames
            .get(&address)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Most recent frame written to a DAC.
    pub fn last_dac_frame(&self, address: u16) -> Option<Vec<u8>> {
        self.0
            .lock()
            .dac_frames
            .get(&address)
            .and_then(|h| h.back().cloned())
    }

    /// All frames written to the serial link, oldest first.
    pub fn serial_frames(&self) -> Vec<Vec<u8>> {
        self.0.lock().serial_frames.iter().cloned().collect()
    }

    /// Operation counters.
    pub fn diagnostics(&self) -> DriverDiagnostics {
        self.0.lock().diagnostics.clone()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.0.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_once_is_consumed() {
        let mut state = SimState::default();
        state.faults.insert(FaultPoint::Serial, Fault::FailOnce);
        assert_eq!(state.take_fault(FaultPoint::Serial), Some(Fault::FailOnce));
        assert_eq!(state.take_fault(FaultPoint::Serial), None);
    }

    #[test]
    fn fail_always_persists() {
        let mut state = SimState::default();
        state.faults.insert(FaultPoint::Pin(4), Fault::FailAlways);
        assert_eq!(state.take_fault(FaultPoint::Pin(4)), Some(Fault::FailAlways));
        assert_eq!(state.take_fault(FaultPoint::Pin(4)), Some(Fault::FailAlways));
    }

    #[test]
    fn history_is_bounded() {
        let mut state = SimState::default();
        for i in 0..(HISTORY_LEN + 10) {
            state.record_serial(&[i as u8]);
        }
        assert_eq!(state.serial_frames.len(), HISTORY_LEN);
        assert_eq!(state.serial_frames.front(), Some(&vec![10u8]));
        assert_eq!(state.diagnostics.serial_writes, (HISTORY_LEN + 10) as u64);
    }
}
