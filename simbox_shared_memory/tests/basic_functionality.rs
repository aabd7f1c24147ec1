//! Basic functionality tests for the shared state store

use simbox_common::consts::SENSOR_COUNT;
use simbox_common::sensors::{SensorVector, ValveStateVector};
use simbox_shared_memory::{ShmError, ShmResult, SharedState, SharedStateStore, StoreConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tempfile::TempDir;

#[test]
fn test_sampler_to_loop_to_monitor() -> ShmResult<()> {
    let dir = TempDir::new()?;
    let config = StoreConfig::in_dir(dir.path());

    let mut owner = SharedStateStore::create(&config)?;
    let mut sampler = SharedStateStore::attach(&config)?;
    let monitor = SharedStateStore::attach(&config)?;

    let mut sensors = SensorVector::default();
    for (i, v) in sensors.as_mut_slice().iter_mut().enumerate() {
        *v = i as f64 * 0.5;
    }
    sampler.write_sensors(&sensors)?;
    assert_eq!(owner.read_sensors()?, sensors);
    assert_eq!(monitor.read_sensors()?, sensors);

    let valves = ValveStateVector::new([false, true, false, true, false, true]);
    owner.write_valve_states(&valves)?;
    assert_eq!(monitor.read_valve_states()?, valves);
    assert_eq!(monitor.valve_sequence()?, 2);

    owner.release()?;
    Ok(())
}

#[test]
fn test_attach_without_owner() {
    let dir = TempDir::new().unwrap();
    let result = SharedStateStore::attach(&StoreConfig::in_dir(dir.path()));
    assert!(matches!(result, Err(ShmError::NotFound { .. })));
}

#[test]
fn test_second_owner_rejected() -> ShmResult<()> {
    let dir = TempDir::new()?;
    let config = StoreConfig::in_dir(dir.path());
    let _owner = SharedStateStore::create(&config)?;

    assert!(matches!(
        SharedStateStore::create(&config),
        Err(ShmError::AlreadyExists { .. })
    ));
    Ok(())
}

#[test]
fn test_readers_never_see_torn_vectors() -> ShmResult<()> {
    let dir = TempDir::new()?;
    let config = StoreConfig::in_dir(dir.path());
    let _owner = SharedStateStore::create(&config)?;

    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let config = config.clone();
        let done = done.clone();
        thread::spawn(move || -> ShmResult<()> {
            let mut sampler = SharedStateStore::attach(&config)?;
            for i in 0..20_000u32 {
                sampler.write_sensors(&SensorVector::new([f64::from(i); SENSOR_COUNT]))?;
            }
            done.store(true, Ordering::Release);
            Ok(())
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let config = config.clone();
            let done = done.clone();
            thread::spawn(move || -> ShmResult<u64> {
                let monitor = SharedStateStore::attach(&config)?;
                let mut consistent = 0;
                while !done.load(Ordering::Acquire) {
                    match monitor.read_sensors() {
                        Ok(sensors) => {
                            let first = sensors.0[0];
                            assert!(sensors.0.iter().all(|&v| v == first), "torn read");
                            consistent += 1;
                        }
                        Err(e) if e.is_transient() => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(consistent)
            })
        })
        .collect();

    writer.join().unwrap()?;
    for reader in readers {
        reader.join().unwrap()?;
    }
    Ok(())
}
