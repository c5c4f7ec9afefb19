//! System V IPC keys and identifiers

use crate::{Error, Result};
use nix::errno::Errno;
use std::ffi::CString;
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Default permissions for shared memory segments (`SHM_R | SHM_A`)
pub const DEFAULT_SHM_MODE: u32 = 0o666;

/// Default permissions for semaphore sets
pub const DEFAULT_SEM_MODE: u32 = 0o777;

/// Key used to look up (or create) an IPC object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpcKey {
    /// `IPC_PRIVATE`: always a fresh object, reachable only through its id
    #[default]
    Private,
    /// Explicit key shared by cooperating processes
    Raw(libc::key_t),
}

impl IpcKey {
    /// Derive a key from an existing file and a project id with `ftok(3)`
    pub fn from_path(path: impl AsRef<Path>, project_id: u8) -> Result<Self> {
        let path = path.as_ref();
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| Error::InvalidKey {
            path: path.display().to_string(),
            source: Errno::EINVAL,
        })?;

        let key = unsafe { libc::ftok(c_path.as_ptr(), libc::c_int::from(project_id)) };
        Errno::result(key).map_err(|source| Error::InvalidKey {
            path: path.display().to_string(),
            source,
        })?;

        Ok(IpcKey::Raw(key))
    }

    /// Raw `key_t` value passed to `shmget`/`semget`
    pub fn as_raw(&self) -> libc::key_t {
        match self {
            IpcKey::Private => libc::IPC_PRIVATE,
            IpcKey::Raw(key) => *key,
        }
    }

    /// Whether this is `IPC_PRIVATE`
    pub fn is_private(&self) -> bool {
        matches!(self, IpcKey::Private)
    }
}

impl fmt::Display for IpcKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpcKey::Private => f.write_str("IPC_PRIVATE"),
            IpcKey::Raw(key) => write!(f, "{:#x}", key),
        }
    }
}

/// Identifier of a shared memory segment.
///
/// Valid in every process on the host until the segment is removed, so it
/// can be handed to other processes by value. Mapped addresses cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShmId(libc::c_int);

impl ShmId {
    pub const fn from_raw(id: libc::c_int) -> Self {
        Self(id)
    }

    pub const fn as_raw(&self) -> libc::c_int {
        self.0
    }
}

impl fmt::Display for ShmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shm#{}", self.0)
    }
}

/// Identifier of a semaphore set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemId(libc::c_int);

impl SemId {
    pub const fn from_raw(id: libc::c_int) -> Self {
        Self(id)
    }

    pub const fn as_raw(&self) -> libc::c_int {
        self.0
    }
}

impl fmt::Display for SemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sem#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_key() {
        let key = IpcKey::default();
        assert!(key.is_private());
        assert_eq!(key.as_raw(), libc::IPC_PRIVATE);
        assert_eq!(key.to_string(), "IPC_PRIVATE");
    }

    #[test]
    fn test_key_from_path() {
        let a = IpcKey::from_path("/", b'x').unwrap();
        let b = IpcKey::from_path("/", b'x').unwrap();
        let c = IpcKey::from_path("/", b'y').unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_private());
    }

    #[test]
    fn test_key_from_missing_path() {
        let err = IpcKey::from_path("/nonexistent/xipc/key", 1).unwrap_err();
        assert!(matches!(err, Error::InvalidKey { source: Errno::ENOENT, .. }));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(ShmId::from_raw(7).to_string(), "shm#7");
        assert_eq!(SemId::from_raw(3).to_string(), "sem#3");
        assert_eq!(ShmId::from_raw(7).as_raw(), 7);
    }
}
