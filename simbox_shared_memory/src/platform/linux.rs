//! Linux-specific shared memory operations

use crate::error::ShmResult;
use memmap2::{MmapMut, MmapOptions};
use nix::unistd::getpid;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Mapping options for region files.
#[derive(Debug, Clone, Copy)]
pub struct MappingOptions {
    /// Pre-fault the pages at map time
    pub populate: bool,
    /// Lock the pages in RAM (`rt` feature)
    pub locked: bool,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            populate: true,
            locked: cfg!(feature = "rt"),
        }
    }
}

/// Create a new region file of `size` bytes and map it.
///
/// Fails with `AlreadyExists` (as an IO error) if the file is present.
pub fn create_region_mmap(
    path: &Path,
    size: usize,
    options: &MappingOptions,
) -> ShmResult<MmapMut> {
    let file = OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .mode(0o600) // Owner read/write only
        .open(path)?;

    file.set_len(size as u64)?;

    let mut mmap_options = MmapOptions::new();
    if options.populate {
        mmap_options.populate();
    }

    let mmap = unsafe { mmap_options.map_mut(&file)? };

    if options.locked {
        if let Err(e) = mmap.lock() {
            tracing::warn!("mlock of {} failed: {}", path.display(), e);
        }
    }

    Ok(mmap)
}

/// Map an existing region file.
pub fn attach_region_mmap(path: &Path) -> ShmResult<MmapMut> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;

    let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
    Ok(mmap)
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // 0 and values above i32::MAX address process groups, not a process.
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    match kill(Pid::from_raw(raw), None) {
        Ok(_) => true,
        Err(nix::Error::ESRCH) => false,
        Err(nix::Error::EPERM) => true, // exists, owned by someone else
        Err(_) => false,
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}
