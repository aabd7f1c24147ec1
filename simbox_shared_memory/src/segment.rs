//! Named fixed-size regions with a seqlock header.
//!
//! ```text
//! ┌──────────────────────── 64 B ────────────────────────┬── payload ──┐
//! │ magic │ size │ seq │ owner pid │ writer pid │ ts ... │  N bytes    │
//! └──────────────────────────────────────────────────────┴─────────────┘
//! ```

use crate::error::{ShmError, ShmResult};
use crate::platform::{
    MappingOptions, attach_region_mmap, create_region_mmap, get_current_pid, is_process_alive,
};
use crate::version::Sequence;
use memmap2::MmapMut;
use static_assertions::const_assert_eq;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Magic number identifying a simbox region.
pub const SIMBOX_SHM_MAGIC: u64 = u64::from_le_bytes(*b"SIMBOXR1");

/// File name prefix of every region.
pub const REGION_PREFIX: &str = "simbox_";

/// Header size in bytes.
pub const HEADER_SIZE: usize = std::mem::size_of::<SegmentHeader>();

/// Region header with cache-line alignment
#[repr(C, align(64))]
pub struct SegmentHeader {
    /// Magic number, written last during creation
    magic: AtomicU64,
    /// Payload size in bytes
    size: u64,
    /// Seqlock sequence
    seq: Sequence,
    /// Process that created the region
    owner_pid: AtomicU32,
    /// Process that last published
    writer_pid: AtomicU32,
    /// Creation timestamp (ns since epoch)
    created_ts: u64,
    /// Last publish timestamp (ns since epoch)
    last_write_ts: AtomicU64,
    _reserved: [u8; 16],
}

const_assert_eq!(std::mem::size_of::<SegmentHeader>(), 64);

impl SegmentHeader {
    /// Payload size recorded in the header
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Current sequence value
    pub fn sequence(&self) -> u64 {
        self.seq.load()
    }

    /// Creator pid
    pub fn owner_pid(&self) -> u32 {
        self.owner_pid.load(Ordering::Acquire)
    }

    /// Last publisher pid (0 before the first publish)
    pub fn writer_pid(&self) -> u32 {
        self.writer_pid.load(Ordering::Acquire)
    }

    /// Creation timestamp (ns since epoch)
    pub fn created_ts(&self) -> u64 {
        self.created_ts
    }

    /// Last publish timestamp (ns since epoch)
    pub fn last_write_ts(&self) -> u64 {
        self.last_write_ts.load(Ordering::Acquire)
    }

    fn is_valid(&self) -> bool {
        self.magic.load(Ordering::Acquire) == SIMBOX_SHM_MAGIC
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Path of region `name` inside `dir`.
pub fn region_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{REGION_PREFIX}{name}"))
}

/// One mapped region.
///
/// Dropping a `Region` only unmaps it; removing the backing file is
/// explicit through [`Region::unlink`].
pub struct Region {
    name: String,
    path: PathBuf,
    payload_size: usize,
    mmap: MmapMut,
}

impl Region {
    /// Create a region holding `payload` as its initial content.
    ///
    /// An existing file whose owner is no longer alive is replaced when
    /// `replace_stale` is set.
    pub fn create(dir: &Path, name: &str, payload: &[u8], replace_stale: bool) -> ShmResult<Self> {
        let path = region_path(dir, name);
        let options = MappingOptions::default();
        let total = HEADER_SIZE + payload.len();

        let mut mmap = match create_region_mmap(&path, total, &options) {
            Ok(mmap) => mmap,
            Err(ShmError::Io { source }) if source.kind() == std::io::ErrorKind::AlreadyExists => {
                if !(replace_stale && Self::is_stale(&path)) {
                    return Err(ShmError::AlreadyExists {
                        name: name.to_string(),
                    });
                }
                tracing::warn!("Replacing stale region {}", path.display());
                std::fs::remove_file(&path)?;
                create_region_mmap(&path, total, &options)?
            }
            Err(ShmError::Io { source })
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                return Err(ShmError::PermissionDenied {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let now = now_ns();
        let pid = get_current_pid();
        // SAFETY: the mapping is at least HEADER_SIZE bytes and page aligned.
        let header = unsafe { &mut *(mmap.as_mut_ptr() as *mut SegmentHeader) };
        header.size = payload.len() as u64;
        header.seq = Sequence::new();
        header.owner_pid = AtomicU32::new(pid);
        header.writer_pid = AtomicU32::new(pid);
        header.created_ts = now;
        header.last_write_ts = AtomicU64::new(now);
        mmap[HEADER_SIZE..].copy_from_slice(payload);
        header.magic.store(SIMBOX_SHM_MAGIC, Ordering::Release);

        tracing::debug!(
            "Created region {} ({} + {} bytes)",
            path.display(),
            HEADER_SIZE,
            payload.len()
        );

        Ok(Self {
            name: name.to_string(),
            path,
            payload_size: payload.len(),
            mmap,
        })
    }

    /// Attach to an existing region whose payload is `expected_size` bytes.
    pub fn attach(dir: &Path, name: &str, expected_size: usize) -> ShmResult<Self> {
        let path = region_path(dir, name);
        let mmap = attach_region_mmap(&path).map_err(|e| match e {
            ShmError::Io { source } if source.kind() == std::io::ErrorKind::NotFound => {
                ShmError::NotFound {
                    name: name.to_string(),
                }
            }
            ShmError::Io { source } if source.kind() == std::io::ErrorKind::PermissionDenied => {
                ShmError::PermissionDenied {
                    name: name.to_string(),
                }
            }
            other => other,
        })?;

        if mmap.len() < HEADER_SIZE {
            return Err(ShmError::InvalidHeader {
                name: name.to_string(),
            });
        }

        let region = Self {
            name: name.to_string(),
            path,
            payload_size: expected_size,
            mmap,
        };

        if !region.header().is_valid() {
            return Err(ShmError::InvalidHeader {
                name: name.to_string(),
            });
        }
        let actual = region.header().size();
        if actual != expected_size || region.mmap.len() != HEADER_SIZE + actual {
            return Err(ShmError::InvalidSize {
                name: name.to_string(),
                expected: expected_size,
                actual,
            });
        }

        Ok(region)
    }

    fn is_stale(path: &Path) -> bool {
        match attach_region_mmap(path) {
            Ok(mmap) if mmap.len() >= HEADER_SIZE => {
                // SAFETY: length checked above.
                let header = unsafe { &*(mmap.as_ptr() as *const SegmentHeader) };
                !header.is_valid() || !is_process_alive(header.owner_pid())
            }
            _ => true,
        }
    }

    /// Region header
    pub fn header(&self) -> &SegmentHeader {
        // SAFETY: the mapping is at least HEADER_SIZE bytes and page aligned.
        unsafe { &*(self.mmap.as_ptr() as *const SegmentHeader) }
    }

    /// Replace the whole payload.
    pub fn publish(&mut self, payload: &[u8]) -> ShmResult<()> {
        if payload.len() != self.payload_size {
            return Err(ShmError::InvalidSize {
                name: self.name.clone(),
                expected: self.payload_size,
                actual: payload.len(),
            });
        }

        let base = self.mmap.as_mut_ptr();
        // SAFETY: the mapping is HEADER_SIZE + payload_size bytes.
        let header = unsafe { &*(base as *const SegmentHeader) };
        let data = unsafe { base.add(HEADER_SIZE) };

        header.seq.begin_write();
        unsafe {
            std::ptr::copy_nonoverlapping(payload.as_ptr(), data, payload.len());
        }
        header.seq.end_write();

        header.writer_pid.store(get_current_pid(), Ordering::Release);
        header.last_write_ts.store(now_ns(), Ordering::Release);
        Ok(())
    }

    /// Copy a consistent payload into `out`, retrying up to `retries` times
    /// while a writer is active. Returns the sequence of the snapshot.
    pub fn snapshot(&self, out: &mut [u8], retries: u32) -> ShmResult<u64> {
        if out.len() != self.payload_size {
            return Err(ShmError::InvalidSize {
                name: self.name.clone(),
                expected: self.payload_size,
                actual: out.len(),
            });
        }

        let header = self.header();
        // SAFETY: the mapping is HEADER_SIZE + payload_size bytes.
        let data = unsafe { self.mmap.as_ptr().add(HEADER_SIZE) };

        for _attempt in 0..retries.max(1) {
            let before = header.seq.load();
            if Sequence::is_writing(before) {
                std::thread::yield_now();
                continue;
            }

            unsafe {
                std::ptr::copy_nonoverlapping(data, out.as_mut_ptr(), out.len());
            }

            if header.seq.reload() == before {
                return Ok(before);
            }
            std::thread::yield_now();
        }

        Err(ShmError::Unavailable {
            name: self.name.clone(),
            retries,
        })
    }

    /// Remove the backing file. The mapping stays valid until drop.
    pub fn unlink(&self) -> ShmResult<()> {
        std::fs::remove_file(&self.path)?;
        tracing::debug!("Unlinked region {}", self.path.display());
        Ok(())
    }

    /// Region name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Payload size in bytes
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    #[cfg(test)]
    pub(crate) fn begin_write_for_test(&self) {
        self.header().seq.begin_write();
    }

    #[cfg(test)]
    pub(crate) fn set_owner_pid_for_test(&self, pid: u32) {
        self.header().owner_pid.store(pid, Ordering::Release);
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("payload_size", &self.payload_size)
            .field("sequence", &self.header().sequence())
            .finish()
    }
}
