//! Stand-in for the sampling process: publishes a slowly varying sensor
//! vector at 50 Hz.
//!
//! ```text
//! cargo run -p simbox_shared_memory --example sensor_feeder -- /dev/shm
//! ```

use rand::Rng;
use simbox_common::consts::{SENSOR_COUNT, THERMISTOR_BASE};
use simbox_common::sensors::SensorVector;
use simbox_shared_memory::{SharedState, SharedStateStore, ShmResult, StoreConfig, init_tracing};
use std::{thread, time::Duration};

fn main() -> ShmResult<()> {
    init_tracing();

    let dir = std::env::args().nth(1).unwrap_or_else(|| "/dev/shm".to_string());
    let mut store = SharedStateStore::attach(&StoreConfig::in_dir(dir))?;
    let mut rng = rand::thread_rng();

    let mut t = 0.0f64;
    loop {
        let mut values = [0.0; SENSOR_COUNT];
        for (i, v) in values.iter_mut().enumerate() {
            let base = if i >= THERMISTOR_BASE { 25.0 } else { 1.0 };
            *v = base + (t + i as f64).sin() * 0.1 + rng.gen_range(-0.01..0.01);
        }
        store.write_sensors(&SensorVector::new(values))?;

        t += 0.02;
        thread::sleep(Duration::from_millis(20));
    }
}
