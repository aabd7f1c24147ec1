//! # Simbox Shared State
//!
//! Fixed-size named regions shared between the control loop, the sampling
//! process and any number of monitoring tools.
//!
//! ## Layout
//!
//! Two regions live under the configured shm directory (`/dev/shm` by
//! default):
//!
//! | File | Payload | Writer |
//! |------|---------|--------|
//! | `simbox_sensors` | 15 × f64 (120 B) | sampling process |
//! | `simbox_valves` | 6 × u8 (6 B) | control loop |
//!
//! Each payload is preceded by a 64-byte header carrying a seqlock
//! sequence. Readers copy the payload and retry while a write is in flight,
//! giving up after a bounded number of attempts so a tick never blocks.
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │ Sampling        │    │  simbox_sensors │    │ Control loop    │
//! │ write_sensors() ├───►│ [Header|Data]   ├───►│ read_sensors()  │
//! └─────────────────┘    └─────────────────┘    └───────┬─────────┘
//!                        ┌─────────────────┐            │
//!                        │  simbox_valves  │◄───────────┘
//!                        │ [Header|Data]   ├───► monitors
//!                        └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use simbox_shared_memory::{SharedState, SharedStateStore, StoreConfig};
//! use simbox_common::sensors::SensorVector;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::TempDir::new()?;
//! let config = StoreConfig::in_dir(dir.path());
//!
//! let mut owner = SharedStateStore::create(&config)?;
//! let mut sampler = SharedStateStore::attach(&config)?;
//!
//! let mut sensors = SensorVector::default();
//! sensors.0[0] = 1.0;
//! sampler.write_sensors(&sensors)?;
//! assert_eq!(owner.read_sensors()?.0[0], 1.0);
//!
//! owner.release()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - One writer per region; the protocol does not arbitrate between writers
//! - Any number of concurrent readers, in any process

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod platform;
pub mod segment;
pub mod store;
pub mod version;

pub use error::{ShmError, ShmResult};
pub use segment::{HEADER_SIZE, Region, SegmentHeader, region_path};
pub use store::{SharedState, SharedStateStore, StoreConfig};
pub use version::Sequence;

/// Initialize tracing for tools built on this crate
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
