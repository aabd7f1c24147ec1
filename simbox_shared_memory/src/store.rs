//! The shared state capability: sensor and valve regions behind one handle.

use crate::error::{ShmError, ShmResult};
use crate::segment::Region;
use simbox_common::config::SimboxConfig;
use simbox_common::consts::{SENSOR_REGION_BYTES, VALVE_REGION_BYTES};
use simbox_common::sensors::{SensorVector, ValveStateVector};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Shared state store parameters.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the region files
    pub dir: PathBuf,
    /// Sensor region name
    pub sensor_region: String,
    /// Valve region name
    pub valve_region: String,
    /// Replace regions left behind by a dead owner
    pub replace_stale: bool,
    /// Read retry budget
    pub read_retries: u32,
    /// Valve vector published at creation
    pub initial_valves: ValveStateVector,
}

impl StoreConfig {
    /// Build from the application configuration.
    pub fn from_config(config: &SimboxConfig) -> Self {
        Self {
            dir: config.shm.dir.clone(),
            sensor_region: config.shm.sensor_region.clone(),
            valve_region: config.shm.valve_region.clone(),
            replace_stale: config.shm.replace_stale,
            read_retries: config.shm.read_retries,
            initial_valves: ValveStateVector::new(config.gpio.initial_valve_states),
        }
    }

    /// Default parameters rooted at `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::from_config(&SimboxConfig::default())
        }
    }
}

/// Read/write access to the shared sensor and valve vectors.
///
/// The cycle engine works against this trait so a tick can be exercised
/// against a store that refuses reads.
pub trait SharedState {
    /// Consistent snapshot of the sensor vector.
    fn read_sensors(&self) -> ShmResult<SensorVector>;

    /// Replace the sensor vector (sampling producer side).
    fn write_sensors(&mut self, sensors: &SensorVector) -> ShmResult<()>;

    /// Consistent snapshot of the valve vector.
    fn read_valve_states(&self) -> ShmResult<ValveStateVector>;

    /// Replace the valve vector.
    fn write_valve_states(&mut self, valves: &ValveStateVector) -> ShmResult<()>;
}

struct Regions {
    sensors: Region,
    valves: Region,
}

/// Owner or peer handle to the two shared regions.
///
/// The owner creates both regions and removes them on [`release`]
/// (or drop). Peers only map and unmap.
///
/// [`release`]: SharedStateStore::release
pub struct SharedStateStore {
    regions: Option<Regions>,
    owner: bool,
    read_retries: u32,
}

impl SharedStateStore {
    /// Create both regions. The sensor region starts zeroed and the valve
    /// region holds `config.initial_valves`.
    pub fn create(config: &StoreConfig) -> ShmResult<Self> {
        let sensors = Region::create(
            &config.dir,
            &config.sensor_region,
            &SensorVector::default().to_bytes(),
            config.replace_stale,
        )?;

        let valves = match Region::create(
            &config.dir,
            &config.valve_region,
            &config.initial_valves.to_bytes(),
            config.replace_stale,
        ) {
            Ok(valves) => valves,
            Err(e) => {
                if let Err(unlink_err) = sensors.unlink() {
                    warn!("Failed to remove {}: {}", sensors.name(), unlink_err);
                }
                return Err(e);
            }
        };

        info!(
            "Shared state created in {} ({}, {})",
            config.dir.display(),
            sensors.name(),
            valves.name()
        );

        Ok(Self {
            regions: Some(Regions { sensors, valves }),
            owner: true,
            read_retries: config.read_retries,
        })
    }

    /// Attach to regions created by another process.
    pub fn attach(config: &StoreConfig) -> ShmResult<Self> {
        let sensors = Region::attach(&config.dir, &config.sensor_region, SENSOR_REGION_BYTES)?;
        let valves = Region::attach(&config.dir, &config.valve_region, VALVE_REGION_BYTES)?;

        debug!("Attached to shared state in {}", config.dir.display());

        Ok(Self {
            regions: Some(Regions { sensors, valves }),
            owner: false,
            read_retries: config.read_retries,
        })
    }

    /// Close the regions. The owner also unlinks them.
    ///
    /// A second call returns [`ShmError::AlreadyReleased`].
    pub fn release(&mut self) -> ShmResult<()> {
        let regions = self.regions.take().ok_or(ShmError::AlreadyReleased)?;

        if self.owner {
            let sensors = regions.sensors.unlink();
            let valves = regions.valves.unlink();
            info!("Shared state released");
            sensors?;
            valves?;
        }
        Ok(())
    }

    /// True once [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.regions.is_none()
    }

    /// True for the handle that created the regions.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Sequence of the sensor region, for change detection.
    pub fn sensor_sequence(&self) -> ShmResult<u64> {
        Ok(self.regions()?.sensors.header().sequence())
    }

    /// Sequence of the valve region, for change detection.
    pub fn valve_sequence(&self) -> ShmResult<u64> {
        Ok(self.regions()?.valves.header().sequence())
    }

    /// Last writer pid and timestamp of the sensor region.
    pub fn sensor_writer(&self) -> ShmResult<(u32, u64)> {
        let header = self.regions()?.sensors.header();
        Ok((header.writer_pid(), header.last_write_ts()))
    }

    fn regions(&self) -> ShmResult<&Regions> {
        self.regions.as_ref().ok_or(ShmError::AlreadyReleased)
    }

    fn regions_mut(&mut self) -> ShmResult<&mut Regions> {
        self.regions.as_mut().ok_or(ShmError::AlreadyReleased)
    }
}

impl SharedState for SharedStateStore {
    fn read_sensors(&self) -> ShmResult<SensorVector> {
        let mut buf = [0u8; SENSOR_REGION_BYTES];
        self.regions()?.sensors.snapshot(&mut buf, self.read_retries)?;
        Ok(SensorVector::from_bytes(&buf))
    }

    fn write_sensors(&mut self, sensors: &SensorVector) -> ShmResult<()> {
        self.regions_mut()?.sensors.publish(&sensors.to_bytes())
    }

    fn read_valve_states(&self) -> ShmResult<ValveStateVector> {
        let mut buf = [0u8; VALVE_REGION_BYTES];
        self.regions()?.valves.snapshot(&mut buf, self.read_retries)?;
        Ok(ValveStateVector::from_bytes(&buf))
    }

    fn write_valve_states(&mut self, valves: &ValveStateVector) -> ShmResult<()> {
        self.regions_mut()?.valves.publish(&valves.to_bytes())
    }
}

impl Drop for SharedStateStore {
    fn drop(&mut self) {
        if self.regions.is_some() {
            if let Err(e) = self.release() {
                warn!("Shared state release on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn owner_starts_with_configured_valves() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::in_dir(dir.path());
        config.initial_valves = ValveStateVector::new([true, false, true, true, false, true]);

        let store = SharedStateStore::create(&config).unwrap();
        assert!(store.is_owner());
        assert_eq!(store.read_valve_states().unwrap(), config.initial_valves);
        assert_eq!(store.read_sensors().unwrap(), SensorVector::default());
    }

    #[test]
    fn release_is_exactly_once() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::in_dir(dir.path());
        let mut store = SharedStateStore::create(&config).unwrap();

        store.release().unwrap();
        assert!(store.is_released());
        assert!(!dir.path().join("simbox_sensors").exists());
        assert!(!dir.path().join("simbox_valves").exists());

        assert!(matches!(store.release(), Err(ShmError::AlreadyReleased)));
        assert!(matches!(store.read_sensors(), Err(ShmError::AlreadyReleased)));
    }

    #[test]
    fn peer_release_leaves_files() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::in_dir(dir.path());
        let _owner = SharedStateStore::create(&config).unwrap();

        let mut peer = SharedStateStore::attach(&config).unwrap();
        assert!(!peer.is_owner());
        peer.release().unwrap();
        assert!(dir.path().join("simbox_sensors").exists());
    }

    #[test]
    fn drop_unlinks_owned_regions() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::in_dir(dir.path());
        drop(SharedStateStore::create(&config).unwrap());
        assert!(!dir.path().join("simbox_sensors").exists());
    }

    #[test]
    fn failed_valve_region_rolls_back_sensor_region() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::in_dir(dir.path());
        std::fs::write(dir.path().join("simbox_valves"), b"occupied").unwrap();

        let mut strict = config.clone();
        strict.replace_stale = false;
        assert!(matches!(
            SharedStateStore::create(&strict),
            Err(ShmError::AlreadyExists { .. })
        ));
        assert!(!dir.path().join("simbox_sensors").exists());
    }
}
