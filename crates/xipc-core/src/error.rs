//! Error types for xipc

use crate::ipc::{SemId, ShmId};
use nix::errno::Errno;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(
        "shmget({size} bytes) failed: {source}. The requested segment size is probably \
         above what the kernel allows; raise kernel.shmmax / kernel.shmall or request less"
    )]
    ResourceExhausted {
        size: usize,
        #[source]
        source: Errno,
    },

    #[error("{context} failed: {source}")]
    AllocationFailed {
        context: String,
        #[source]
        source: Errno,
    },

    #[error("shmat({id}) failed: {source}")]
    AttachFailed {
        id: ShmId,
        #[source]
        source: Errno,
    },

    #[error("shmdt({id}) failed: {source}")]
    DetachFailed {
        id: ShmId,
        #[source]
        source: Errno,
    },

    #[error("segment {id} is {actual} bytes, cannot attach {requested} bytes")]
    SizeMismatch {
        id: ShmId,
        requested: usize,
        actual: usize,
    },

    #[error("shmctl({id}, IPC_STAT) failed: {source}")]
    StatFailed {
        id: ShmId,
        #[source]
        source: Errno,
    },

    #[error("semop({id}) lock failed: {source}")]
    LockFailed {
        id: SemId,
        #[source]
        source: Errno,
    },

    #[error("semop({id}) unlock failed: {source}")]
    UnlockFailed {
        id: SemId,
        #[source]
        source: Errno,
    },

    #[error("semop({id}) wait for zero failed: {source}")]
    WaitFailed {
        id: SemId,
        #[source]
        source: Errno,
    },

    #[error("semctl({id}) read failed: {source}")]
    ReadFailed {
        id: SemId,
        #[source]
        source: Errno,
    },

    #[error("cannot derive IPC key from {path}: {source}")]
    InvalidKey {
        path: String,
        #[source]
        source: Errno,
    },
}

impl Error {
    /// OS error behind this failure, if any
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::ResourceExhausted { source, .. }
            | Error::AllocationFailed { source, .. }
            | Error::AttachFailed { source, .. }
            | Error::DetachFailed { source, .. }
            | Error::StatFailed { source, .. }
            | Error::LockFailed { source, .. }
            | Error::UnlockFailed { source, .. }
            | Error::WaitFailed { source, .. }
            | Error::ReadFailed { source, .. }
            | Error::InvalidKey { source, .. } => Some(*source),
            Error::SizeMismatch { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_names_size() {
        let err = Error::ResourceExhausted {
            size: 1 << 30,
            source: Errno::EINVAL,
        };
        let msg = err.to_string();
        assert!(msg.contains("1073741824 bytes"));
        assert!(msg.contains("kernel.shmmax"));
        assert_eq!(err.errno(), Some(Errno::EINVAL));
    }

    #[test]
    fn test_size_mismatch_has_no_errno() {
        let err = Error::SizeMismatch {
            id: ShmId::from_raw(1),
            requested: 8192,
            actual: 4096,
        };
        assert_eq!(err.errno(), None);
        assert_eq!(err.to_string(), "segment shm#1 is 4096 bytes, cannot attach 8192 bytes");
    }
}
