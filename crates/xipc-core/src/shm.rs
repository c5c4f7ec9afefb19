//! System V shared memory segment wrapper
//!
//! A segment is created once, then attached by every process that needs it.
//! Each attach marks the segment for removal, so the kernel frees it after
//! the last process detaches, even if the creator never cleans up.

use crate::ipc::{IpcKey, ShmId, DEFAULT_SHM_MODE};
use crate::{Error, Result};
use nix::errno::Errno;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ptr::{self, NonNull};
use tracing::{debug, warn};

/// Segment creation settings
#[derive(Debug, Clone)]
pub struct RegionConf {
    key: IpcKey,
    size: usize,
    mode: u32,
}

impl Default for RegionConf {
    fn default() -> Self {
        Self {
            key: IpcKey::Private,
            size: 0,
            mode: DEFAULT_SHM_MODE,
        }
    }
}

impl RegionConf {
    /// Default settings: private key, size 0, mode `0o666`
    pub fn new() -> Self {
        Self::default()
    }

    /// Key of the segment (defaults to `IPC_PRIVATE`)
    pub fn key(mut self, key: IpcKey) -> Self {
        self.key = key;
        self
    }

    /// Segment size in bytes
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Permission bits
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Create a new segment.
    ///
    /// A non-private key must not name a live segment: attaching marks a
    /// segment for removal, which also drops its key, so keyed lookup would
    /// hand out fresh storage once anyone attached. Share the returned
    /// [`ShmId`] instead.
    pub fn create(&self) -> Result<ShmId> {
        if self.size == 0 {
            return Err(Error::AllocationFailed {
                context: format!("shmget(key={}, size=0)", self.key),
                source: Errno::EINVAL,
            });
        }

        let flags = libc::IPC_CREAT | libc::IPC_EXCL | (self.mode & 0o777) as libc::c_int;
        let raw = unsafe { libc::shmget(self.key.as_raw(), self.size, flags) };

        // With IPC_EXCL and a non-zero size, EINVAL can only mean the size
        // is above SHMMAX
        let raw = Errno::result(raw).map_err(|source| match source {
            Errno::EINVAL | Errno::ENOSPC | Errno::ENOMEM => Error::ResourceExhausted {
                size: self.size,
                source,
            },
            _ => Error::AllocationFailed {
                context: format!("shmget(key={}, size={}, IPC_CREAT | IPC_EXCL)", self.key, self.size),
                source,
            },
        })?;

        let id = ShmId::from_raw(raw);
        debug!(shm = %id, key = %self.key, size = self.size, "created shared memory segment");
        Ok(id)
    }
}

/// Kernel-side view of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Size in bytes, as requested at creation
    pub size: usize,
    /// Number of current attachments across all processes
    pub attached: u64,
}

/// A segment mapped into the calling process
pub struct SharedRegion {
    id: ShmId,
    base: NonNull<u8>,
    #[cfg(feature = "memprotect")]
    read_only: Option<NonNull<u8>>,
    size: usize,
}

// Safety: the mapping belongs to the process, not to the creating thread
unsafe impl Send for SharedRegion {}

impl SharedRegion {
    /// Create a new private segment of exactly `size` bytes
    pub fn create(size: usize) -> Result<ShmId> {
        RegionConf::new().size(size).create()
    }

    /// Map a segment read-write into this process.
    ///
    /// On success the segment is marked for removal. Mappings that already
    /// exist (here or in other processes) stay valid; the storage goes away
    /// with the last detach.
    pub fn attach(id: ShmId, size: usize) -> Result<Self> {
        let info = Self::stat(id).map_err(|e| match e {
            Error::StatFailed { source, .. } => Error::AttachFailed { id, source },
            other => other,
        })?;
        if size > info.size {
            return Err(Error::SizeMismatch {
                id,
                requested: size,
                actual: info.size,
            });
        }

        let addr = unsafe { libc::shmat(id.as_raw(), ptr::null(), 0) };
        let addr = Errno::result(addr).map_err(|source| Error::AttachFailed { id, source })?;
        let base = NonNull::new(addr as *mut u8).ok_or(Error::AttachFailed {
            id,
            source: Errno::EFAULT,
        })?;

        let region = Self {
            id,
            base,
            #[cfg(feature = "memprotect")]
            read_only: Self::attach_read_only(id),
            size,
        };

        Self::destroy(id);
        debug!(shm = %id, size, addr = ?base, "attached shared memory segment");
        Ok(region)
    }

    /// Second, read-only mapping of the same segment. Failure only disables
    /// protection for this process.
    #[cfg(feature = "memprotect")]
    fn attach_read_only(id: ShmId) -> Option<NonNull<u8>> {
        let addr = unsafe { libc::shmat(id.as_raw(), ptr::null(), libc::SHM_RDONLY) };
        match Errno::result(addr) {
            Ok(addr) => NonNull::new(addr as *mut u8),
            Err(e) => {
                warn!(shm = %id, error = %e, "read-only mapping failed, memory protection disabled");
                None
            }
        }
    }

    /// Unmap this process's views of the segment
    pub fn detach(self) -> Result<()> {
        let mut this = ManuallyDrop::new(self);
        this.unmap()
    }

    fn unmap(&mut self) -> Result<()> {
        let primary = Errno::result(unsafe { libc::shmdt(self.base.as_ptr() as *const libc::c_void) });

        #[cfg(feature = "memprotect")]
        let secondary = match self.read_only.take() {
            Some(ro) => Errno::result(unsafe { libc::shmdt(ro.as_ptr() as *const libc::c_void) }),
            None => Ok(0),
        };
        #[cfg(not(feature = "memprotect"))]
        let secondary: nix::Result<libc::c_int> = Ok(0);

        primary
            .and(secondary)
            .map_err(|source| Error::DetachFailed { id: self.id, source })?;

        debug!(shm = %self.id, "detached shared memory segment");
        Ok(())
    }

    /// Mark a segment for removal. Errors are ignored: the segment may
    /// already be gone, which is the usual case.
    pub fn destroy(id: ShmId) {
        let ret = unsafe { libc::shmctl(id.as_raw(), libc::IPC_RMID, ptr::null_mut()) };
        if let Err(e) = Errno::result(ret) {
            debug!(shm = %id, error = %e, "shmctl(IPC_RMID) ignored");
        }
    }

    /// Query size and attach count of a segment
    pub fn stat(id: ShmId) -> Result<SegmentInfo> {
        let mut ds = MaybeUninit::<libc::shmid_ds>::zeroed();
        let ret = unsafe { libc::shmctl(id.as_raw(), libc::IPC_STAT, ds.as_mut_ptr()) };
        Errno::result(ret).map_err(|source| Error::StatFailed { id, source })?;

        let ds = unsafe { ds.assume_init() };
        Ok(SegmentInfo {
            size: ds.shm_segsz as usize,
            attached: ds.shm_nattch as u64,
        })
    }

    /// Get the segment identifier
    pub fn id(&self) -> ShmId {
        self.id
    }

    /// Get the size of the mapping
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get a raw pointer to the writable mapping
    pub fn as_ptr(&self) -> *const u8 {
        self.base.as_ptr()
    }

    /// Get a mutable raw pointer to the writable mapping
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Get a slice view of the mapping
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.size) }
    }

    /// Get a mutable slice view of the mapping
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), self.size) }
    }

    /// Read-only alias of the same bytes, if the second mapping succeeded
    #[cfg(feature = "memprotect")]
    pub fn read_only(&self) -> Option<&[u8]> {
        self.read_only
            .map(|ro| unsafe { std::slice::from_raw_parts(ro.as_ptr() as *const u8, self.size) })
    }

    /// Whether the read-only alias is mapped
    #[cfg(feature = "memprotect")]
    pub fn is_protected(&self) -> bool {
        self.read_only.is_some()
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let Err(e) = self.unmap() {
            warn!(error = %e, "failed to detach shared memory segment on drop");
        }
    }
}
