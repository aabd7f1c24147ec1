//! Shared state read/write benchmarks

use criterion::{Criterion, criterion_group, criterion_main};
use simbox_common::sensors::{SensorVector, ValveStateVector};
use simbox_shared_memory::{SharedState, SharedStateStore, StoreConfig};
use std::hint::black_box;

fn bench_store(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    let config = StoreConfig::in_dir(dir.path());
    let mut store = SharedStateStore::create(&config).unwrap();

    let sensors = SensorVector::new([1.25; 15]);
    let valves = ValveStateVector::default();

    c.bench_function("write_sensors", |b| {
        b.iter(|| store.write_sensors(black_box(&sensors)).unwrap());
    });

    c.bench_function("read_sensors", |b| {
        b.iter(|| black_box(store.read_sensors().unwrap()));
    });

    c.bench_function("write_valve_states", |b| {
        b.iter(|| store.write_valve_states(black_box(&valves)).unwrap());
    });

    store.release().unwrap();
}

criterion_group!(benches, bench_store);
criterion_main!(benches);
