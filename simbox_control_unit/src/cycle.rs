//! Cycle engine: one tick of the control loop.
//!
//! Each tick runs three phases:
//!
//! 1. **Read**: snapshot the shared sensor vector and the mass-spec / UV
//!    producers. If the snapshot fails the tick is skipped entirely.
//! 2. **Process**: fuzz, calibrate, and encode the three frames.
//! 3. **Write**: DAC0, DAC1, serial (stopping at the first failure), then
//!    poll the valve pins and publish the valve vector.

use crate::calibration::CalibrationBank;
use crate::codec::{AnalogFrame, ChannelCodec, DigitalFrame};
use crate::error::TickError;
use crate::fuzz::FuzzModel;
use simbox_common::config::{ChannelMap, SimboxConfig};
use simbox_common::consts::VALVE_COUNT;
use simbox_common::hal::driver::{HalDriver, HalError, StatusIndicator};
use simbox_common::hal::types::OutputTarget;
use simbox_common::sensors::ValveStateVector;
use simbox_hal::producers::{FakeMassSpec, FakeUv, MassSpecSource, UvSource};
use simbox_shared_memory::SharedState;
use tracing::{info, trace, warn};

/// Log the first few occurrences of a repeating failure, then every 1000th.
#[inline]
fn should_log(count: u64) -> bool {
    count <= 10 || count % 1000 == 0
}

// ─── Counters ───────────────────────────────────────────────────────

/// Running totals kept by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleCounters {
    /// Ticks attempted, skipped ones included.
    pub ticks: u64,
    /// Ticks skipped because the sensor snapshot failed.
    pub skipped: u64,
    /// Failed writes, indexed by [`OutputTarget::index`].
    pub write_failures: [u64; 3],
    /// Pin reads replaced by the configured default level.
    pub pin_read_failures: u64,
    /// Valve vector publishes that failed.
    pub valve_publish_failures: u64,
}

impl CycleCounters {
    /// Failed writes to one target.
    pub fn write_failures(&self, target: OutputTarget) -> u64 {
        self.write_failures[target.index()]
    }
}

// ─── Tick outcome ───────────────────────────────────────────────────

/// Frames produced by one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickFrames {
    /// Bytes for DAC0.
    pub dac0: AnalogFrame,
    /// Bytes for DAC1.
    pub dac1: AnalogFrame,
    /// Bytes for the co-processor.
    pub digital: DigitalFrame,
}

/// What happened during one tick.
#[derive(Debug)]
pub struct TickOutcome {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Frames built this tick; `None` when the tick was skipped.
    pub frames: Option<TickFrames>,
    /// Output whose write failed, if any.
    pub failed_write: Option<OutputTarget>,
    /// Valve vector published this tick.
    pub valves: Option<ValveStateVector>,
    /// First error of the tick.
    pub error: Option<TickError>,
}

impl TickOutcome {
    /// True when the sensor snapshot failed and nothing was written.
    pub fn is_skipped(&self) -> bool {
        self.frames.is_none()
    }

    /// True when every write and the valve publish succeeded.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

/// Valve input pins and the level substituted when a read fails.
#[derive(Debug, Clone, Copy)]
struct ValvePins {
    pins: [u8; VALVE_COUNT],
    defaults: [bool; VALVE_COUNT],
}

/// Runs ticks against a shared state store and a peripheral driver.
pub struct CycleEngine<S: SharedState> {
    store: S,
    driver: Box<dyn HalDriver>,
    bank: CalibrationBank,
    fuzz: FuzzModel,
    codec: ChannelCodec,
    channels: ChannelMap,
    mass_spec: Box<dyn MassSpecSource>,
    uv: Box<dyn UvSource>,
    dac_addresses: [u16; 2],
    valves: ValvePins,
    counters: CycleCounters,
    started: bool,
    error_lit: bool,
}

impl<S: SharedState> CycleEngine<S> {
    /// Build an engine from configuration. The driver must already be
    /// initialized.
    pub fn new(config: &SimboxConfig, store: S, driver: Box<dyn HalDriver>) -> Self {
        Self {
            store,
            driver,
            bank: CalibrationBank::from_config(&config.calibration),
            fuzz: FuzzModel::from_config(&config.fuzz),
            codec: ChannelCodec::from_config(&config.codec),
            channels: config.channels.clone(),
            mass_spec: Box::new(FakeMassSpec::from_config(&config.producers)),
            uv: Box::new(FakeUv::from_config(&config.producers)),
            dac_addresses: [config.bus.dac0_address, config.bus.dac1_address],
            valves: ValvePins {
                pins: config.gpio.valve_pins,
                defaults: config.gpio.initial_valve_states,
            },
            counters: CycleCounters::default(),
            started: false,
            error_lit: false,
        }
    }

    /// Replace the mass-spec and UV sources.
    pub fn with_producers(
        mut self,
        mass_spec: Box<dyn MassSpecSource>,
        uv: Box<dyn UvSource>,
    ) -> Self {
        self.mass_spec = mass_spec;
        self.uv = uv;
        self
    }

    /// Replace the calibration bank.
    pub fn with_calibration(mut self, bank: CalibrationBank) -> Self {
        self.bank = bank;
        self
    }

    /// Replace the channel codec.
    pub fn with_codec(mut self, codec: ChannelCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Running totals.
    pub fn counters(&self) -> &CycleCounters {
        &self.counters
    }

    /// The shared state store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The shared state store, mutably.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The peripheral driver.
    pub fn driver_mut(&mut self) -> &mut dyn HalDriver {
        self.driver.as_mut()
    }

    /// Give back the store and driver for shutdown.
    pub fn into_parts(self) -> (S, Box<dyn HalDriver>) {
        (self.store, self.driver)
    }

    /// Execute one tick. Never fails: errors are logged, counted and
    /// reported in the outcome.
    pub fn run_cycle(&mut self) -> TickOutcome {
        self.counters.ticks += 1;
        let tick = self.counters.ticks;

        // ═══ READ PHASE ═══
        let mut sensors = match self.store.read_sensors() {
            Ok(sensors) => sensors,
            Err(e) => {
                self.counters.skipped += 1;
                if should_log(self.counters.skipped) {
                    warn!(
                        "Tick {} skipped ({} total): sensor snapshot failed: {}",
                        tick, self.counters.skipped, e
                    );
                }
                return TickOutcome {
                    tick,
                    frames: None,
                    failed_write: None,
                    valves: None,
                    error: Some(TickError::SharedStateUnavailable(e)),
                };
            }
        };

        if !self.started {
            self.started = true;
            self.driver.ready(true);
            info!("First tick executed, outputs live");
        }

        let mass_spec = self.mass_spec.read_mass_spec();
        let uv = self.uv.read_uv();

        // ═══ PROCESS PHASE ═══
        self.fuzz.apply(&mut sensors);
        self.bank.apply(&mut sensors);

        let frames = TickFrames {
            dac0: self.codec.build_dac0(&self.channels, &sensors),
            dac1: self.codec.build_dac1(&self.channels, &sensors, &mass_spec),
            digital: self.codec.build_digital(&sensors, &uv),
        };
        trace!(
            "Tick {}: dac0={:02x?} dac1={:02x?} digital={:02x?}",
            tick,
            frames.dac0.as_slice(),
            frames.dac1.as_slice(),
            frames.digital
        );

        // ═══ WRITE PHASE ═══
        let mut error = None;
        let mut failed_write = None;

        match self.write_outputs(&frames) {
            Ok(()) => {
                if self.error_lit {
                    self.error_lit = false;
                    self.driver.error(false);
                    info!("Outputs recovered at tick {}", tick);
                }
            }
            Err((target, source)) => {
                let failures = &mut self.counters.write_failures[target.index()];
                *failures += 1;
                if should_log(*failures) {
                    warn!(
                        "Tick {}: {} write failed ({} total), remaining outputs skipped: {}",
                        tick, target, *failures, source
                    );
                }
                if !self.error_lit {
                    self.error_lit = true;
                    self.driver.error(true);
                }
                failed_write = Some(target);
                error = Some(TickError::TransientIo { target, source });
            }
        }

        let valves = self.read_valves();
        let published = match self.store.write_valve_states(&valves) {
            Ok(()) => Some(valves),
            Err(e) => {
                self.counters.valve_publish_failures += 1;
                if should_log(self.counters.valve_publish_failures) {
                    warn!("Tick {}: valve publish failed: {}", tick, e);
                }
                error.get_or_insert(TickError::SharedStateUnavailable(e));
                None
            }
        };

        TickOutcome {
            tick,
            frames: Some(frames),
            failed_write,
            valves: published,
            error,
        }
    }

    /// DAC0, DAC1, serial. Stops at the first failure.
    fn write_outputs(&mut self, frames: &TickFrames) -> Result<(), (OutputTarget, HalError)> {
        let [dac0, dac1] = self.dac_addresses;
        self.driver
            .write_dac(dac0, &frames.dac0)
            .map_err(|e| (OutputTarget::Dac0, e))?;
        self.driver
            .write_dac(dac1, &frames.dac1)
            .map_err(|e| (OutputTarget::Dac1, e))?;
        self.driver
            .write_serial(&frames.digital)
            .map_err(|e| (OutputTarget::Serial, e))
    }

    fn read_valves(&mut self) -> ValveStateVector {
        let ValvePins { pins, defaults } = self.valves;
        let mut states = defaults;
        for (state, pin) in states.iter_mut().zip(pins) {
            match self.driver.read_input(pin) {
                Ok(level) => *state = level,
                Err(e) => {
                    self.counters.pin_read_failures += 1;
                    if should_log(self.counters.pin_read_failures) {
                        warn!("Pin {} read failed, using default {}: {}", pin, *state, e);
                    }
                }
            }
        }
        ValveStateVector::new(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simbox_hal::drivers::simulation::{Fault, FaultPoint, SimHandle, SimulationDriver};
    use simbox_common::hal::types::StatusLed;
    use simbox_shared_memory::{ShmError, ShmResult};
    use simbox_common::sensors::SensorVector;

    /// In-memory store; `fail_reads` makes every sensor snapshot fail.
    #[derive(Default)]
    struct MemoryStore {
        sensors: SensorVector,
        valves: ValveStateVector,
        fail_reads: bool,
    }

    impl SharedState for MemoryStore {
        fn read_sensors(&self) -> ShmResult<SensorVector> {
            if self.fail_reads {
                return Err(ShmError::Unavailable {
                    name: "memory".into(),
                    retries: 1,
                });
            }
            Ok(self.sensors)
        }

        fn write_sensors(&mut self, sensors: &SensorVector) -> ShmResult<()> {
            self.sensors = *sensors;
            Ok(())
        }

        fn read_valve_states(&self) -> ShmResult<ValveStateVector> {
            Ok(self.valves)
        }

        fn write_valve_states(&mut self, valves: &ValveStateVector) -> ShmResult<()> {
            self.valves = *valves;
            Ok(())
        }
    }

    fn engine(store: MemoryStore) -> (CycleEngine<MemoryStore>, SimHandle) {
        let config = SimboxConfig::default();
        let mut driver = SimulationDriver::new();
        let handle = driver.handle();
        driver.init(&config).unwrap();
        let engine = CycleEngine::new(&config, store, Box::new(driver)).with_producers(
            Box::new(FakeMassSpec::constant([1.0, 0.5])),
            Box::new(FakeUv::constant([12.0, 8.0, 0.4, 0.3, 5.0])),
        );
        (engine, handle)
    }

    #[test]
    fn clean_tick_writes_everything() {
        let (mut engine, handle) = engine(MemoryStore::default());
        let outcome = engine.run_cycle();

        assert!(outcome.is_clean());
        assert_eq!(outcome.tick, 1);
        assert_eq!(handle.dac_frames(0x28).len(), 1);
        assert_eq!(handle.dac_frames(0x29).len(), 1);
        assert_eq!(handle.serial_frames().len(), 1);
        assert_eq!(engine.store().valves, ValveStateVector::default());
        assert!(handle.led(StatusLed::Ready));
    }

    #[test]
    fn skipped_tick_touches_nothing() {
        let store = MemoryStore {
            fail_reads: true,
            valves: ValveStateVector::new([false; 6]),
            ..Default::default()
        };
        let (mut engine, handle) = engine(store);
        let outcome = engine.run_cycle();

        assert!(outcome.is_skipped());
        assert!(matches!(outcome.error, Some(TickError::SharedStateUnavailable(_))));
        assert!(handle.dac_frames(0x28).is_empty());
        assert!(handle.serial_frames().is_empty());
        assert_eq!(engine.store().valves, ValveStateVector::new([false; 6]));
        assert!(!handle.led(StatusLed::Ready));
        assert_eq!(engine.counters().skipped, 1);
    }

    #[test]
    fn dac1_failure_skips_serial_but_not_valves() {
        let (mut engine, handle) = engine(MemoryStore::default());
        handle.inject(FaultPoint::Dac(0x29), Fault::FailOnce);
        handle.set_input(14, false);

        let outcome = engine.run_cycle();
        assert_eq!(outcome.failed_write, Some(OutputTarget::Dac1));
        assert_eq!(handle.dac_frames(0x28).len(), 1);
        assert!(handle.serial_frames().is_empty());
        assert_eq!(
            outcome.valves,
            Some(ValveStateVector::new([true, false, true, true, true, true]))
        );
        assert!(handle.led(StatusLed::Error));
        assert_eq!(engine.counters().write_failures(OutputTarget::Dac1), 1);

        let outcome = engine.run_cycle();
        assert!(outcome.is_clean());
        assert!(!handle.led(StatusLed::Error));
        assert_eq!(handle.serial_frames().len(), 1);
    }

    #[test]
    fn failed_pin_read_uses_default() {
        let (mut engine, handle) = engine(MemoryStore::default());
        handle.set_input(4, false);
        handle.inject(FaultPoint::Pin(4), Fault::FailAlways);

        let outcome = engine.run_cycle();
        assert_eq!(outcome.valves.map(|v| v.0[0]), Some(true));
        assert_eq!(engine.counters().pin_read_failures, 1);
    }

    #[test]
    fn calibrated_pressure_reaches_dac0() {
        let mut sensors = SensorVector::default();
        sensors.0[0] = 1.0;
        let (mut engine, _) = engine(MemoryStore {
            sensors,
            ..Default::default()
        });

        let frames = engine.run_cycle().frames.unwrap();
        // 0.2698 * 1.0 + 0.1013 = 0.3711 V -> floor(0.3711 / 3.3 * 255) = 28
        assert_eq!(&frames.dac0[0..2], &[0x0, 28]);
        // 1.0 V mass spec on channel 0 of DAC1
        assert_eq!(&frames.dac1[0..2], &[0x0, 77]);
    }

    #[test]
    fn replaced_bank_and_codec_drive_the_frames() {
        use simbox_common::calibration::CalibrationFunction;
        use simbox_common::config::CodecConfig;
        use simbox_common::sensors::ChannelGroup;

        let mut bank = CalibrationBank::default();
        assert!(bank.set(ChannelGroup::Pressure, 0, CalibrationFunction::linear(0.0, 3.3)));
        let codec = ChannelCodec::from_config(&CodecConfig {
            dac_vref: 5.0,
            ..Default::default()
        });

        let (engine, _) = engine(MemoryStore::default());
        let mut engine = engine.with_calibration(bank).with_codec(codec);

        let frames = engine.run_cycle().frames.unwrap();
        // 3.3 V against a 5 V reference: floor(0.66 * 255) = 168
        assert_eq!(&frames.dac0[0..2], &[0x0, 168]);
    }

    #[test]
    fn store_and_driver_stay_reachable_between_ticks() {
        let (mut engine, _) = engine(MemoryStore::default());
        engine.run_cycle();

        let mut sensors = SensorVector::default();
        sensors.0[0] = 1.0;
        engine.store_mut().write_sensors(&sensors).unwrap();
        let frames = engine.run_cycle().frames.unwrap();
        assert_eq!(&frames.dac0[0..2], &[0x0, 28]);

        let diag = engine.driver_mut().diagnostics().unwrap();
        assert_eq!(diag.bus_writes, 4);
        assert_eq!(diag.serial_writes, 2);
    }
}
