//! Platform-specific region mapping and process helpers.

pub mod linux;

pub use linux::{
    MappingOptions, attach_region_mmap, create_region_mmap, get_current_pid, is_process_alive,
};
