//! Print the shared sensor and valve vectors whenever they change.
//!
//! ```text
//! cargo run -p simbox_shared_memory --example state_monitor -- /dev/shm
//! ```

use simbox_shared_memory::{SharedState, SharedStateStore, ShmResult, StoreConfig, init_tracing};
use std::{thread, time::Duration};
use tracing::{info, warn};

fn main() -> ShmResult<()> {
    init_tracing();

    let dir = std::env::args().nth(1).unwrap_or_else(|| "/dev/shm".to_string());
    let store = SharedStateStore::attach(&StoreConfig::in_dir(dir))?;

    let mut last = (u64::MAX, u64::MAX);
    loop {
        let current = (store.sensor_sequence()?, store.valve_sequence()?);
        if current != last {
            match (store.read_sensors(), store.read_valve_states()) {
                (Ok(sensors), Ok(valves)) => {
                    let (pid, ts) = store.sensor_writer()?;
                    info!("sensors {:?} (pid {}, ts {})", sensors.as_slice(), pid, ts);
                    info!("valves  {:?}", valves.as_slice());
                    last = current;
                }
                (Err(e), _) | (_, Err(e)) => warn!("read failed: {}", e),
            }
        }
        thread::sleep(Duration::from_millis(100));
    }
}
