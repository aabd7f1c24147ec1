//! Control unit errors.
//!
//! Per-tick failures ([`TickError`]) are logged and counted but never leave
//! the scheduler. Only [`InitError`] reaches the process boundary.

use simbox_common::config::ConfigError;
use simbox_common::hal::driver::HalError;
use simbox_common::hal::types::OutputTarget;
use simbox_shared_memory::ShmError;
use thiserror::Error;

/// A failure confined to one tick.
#[derive(Debug, Error)]
pub enum TickError {
    /// A bus or serial write timed out or was rejected. The rest of this
    /// tick's output writes are skipped.
    #[error("{target} write failed: {source}")]
    TransientIo {
        /// Output that failed.
        target: OutputTarget,
        /// Driver error.
        #[source]
        source: HalError,
    },

    /// The shared regions could not be read or written this tick.
    #[error("shared state unavailable: {0}")]
    SharedStateUnavailable(#[from] ShmError),
}

/// The scheduler could not keep time.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Reading the monotonic clock failed.
    #[error("monotonic clock: {0}")]
    Clock(#[from] nix::errno::Errno),
}

/// A startup failure. The process exits after releasing whatever it acquired.
#[derive(Debug, Error)]
pub enum InitError {
    /// Configuration could not be loaded or failed validation.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    /// Shared regions could not be created.
    #[error("shared memory: {0}")]
    SharedMemory(#[from] ShmError),

    /// Driver lookup or initialization failed.
    #[error("driver: {0}")]
    Driver(#[from] HalError),

    /// Real-time setup failed.
    #[error("RT setup: {0}")]
    Rt(String),

    /// The scheduler could not start.
    #[error("scheduler: {0}")]
    Schedule(#[from] ScheduleError),

    /// Signal handler could not be installed.
    #[error("signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_error_display() {
        let err = TickError::TransientIo {
            target: OutputTarget::Dac1,
            source: HalError::CommunicationError("nak".into()),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("dac1 write failed"), "{msg}");
        assert!(msg.contains("nak"), "{msg}");

        let err = TickError::from(ShmError::Unavailable {
            name: "simbox_sensors".into(),
            retries: 10,
        });
        assert!(err.to_string().starts_with("shared state unavailable"));
    }

    #[test]
    fn init_error_wraps_sources() {
        let err: InitError = HalError::DriverNotFound("bogus".into()).into();
        assert!(matches!(err, InitError::Driver(_)));
        assert!(InitError::Rt("mlockall".into()).to_string().contains("mlockall"));
    }
}
