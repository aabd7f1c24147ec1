//! Error types for shared memory operations

use thiserror::Error;

/// Errors that can occur during shared memory operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// Region already exists and its owner is alive
    #[error("Region already exists: {name}")]
    AlreadyExists {
        /// Region name
        name: String,
    },

    /// Region not found
    #[error("Region not found: {name}")]
    NotFound {
        /// Region name
        name: String,
    },

    /// Region payload does not have the expected size
    #[error("Invalid region size for {name}: expected {expected} bytes, found {actual}")]
    InvalidSize {
        /// Region name
        name: String,
        /// Size the caller expects
        expected: usize,
        /// Size found in the region
        actual: usize,
    },

    /// Region header is missing or corrupt
    #[error("Invalid region header: {name}")]
    InvalidHeader {
        /// Region name
        name: String,
    },

    /// No consistent snapshot could be taken within the retry budget
    #[error("Region {name} unavailable: writer busy after {retries} retries")]
    Unavailable {
        /// Region name
        name: String,
        /// Retries attempted
        retries: u32,
    },

    /// The store has already been released
    #[error("Shared state already released")]
    AlreadyReleased,

    /// Permission denied
    #[error("Permission denied accessing region: {name}")]
    PermissionDenied {
        /// Region name
        name: String,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },
}

impl ShmError {
    /// True if the failure is transient and a later tick may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_is_transient() {
        let busy = ShmError::Unavailable {
            name: "sensors".to_string(),
            retries: 10,
        };
        assert!(busy.is_transient());
        assert!(busy.to_string().contains("10 retries"));
        assert!(!ShmError::AlreadyReleased.is_transient());
    }
}
