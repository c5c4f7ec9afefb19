//! System V semaphore usable as a cross-process lock
//!
//! Every decrement and increment is issued with `SEM_UNDO`: when a process
//! exits (or is killed) the kernel reverts its outstanding adjustments, so a
//! crashed lock holder cannot leave the lock taken forever.

use crate::guard::SemaphoreGuard;
use crate::ipc::{IpcKey, SemId, DEFAULT_SEM_MODE};
use crate::{Error, Result};
use nix::errno::Errno;
use tracing::{debug, trace};

/// Result of a blocking semaphore operation
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The operation was performed
    Completed,
    /// A signal interrupted the wait; nothing was acquired or observed
    Interrupted,
}

impl WaitOutcome {
    /// Whether the operation actually happened
    pub fn is_completed(&self) -> bool {
        *self == WaitOutcome::Completed
    }
}

/// Semaphore creation settings
#[derive(Debug, Clone)]
pub struct SemaphoreConf {
    key: IpcKey,
    initial_value: u32,
    mode: u32,
}

impl Default for SemaphoreConf {
    fn default() -> Self {
        Self {
            key: IpcKey::Private,
            initial_value: 1,
            mode: DEFAULT_SEM_MODE,
        }
    }
}

impl SemaphoreConf {
    /// Default settings: private key, initial value 1, mode `0o777`
    pub fn new() -> Self {
        Self::default()
    }

    /// Key of the semaphore set (defaults to `IPC_PRIVATE`)
    pub fn key(mut self, key: IpcKey) -> Self {
        self.key = key;
        self
    }

    /// Counter value for a freshly created set (defaults to 1)
    pub fn initial_value(mut self, value: u32) -> Self {
        self.initial_value = value;
        self
    }

    /// Permission bits
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Create the semaphore, or open it if the key is already taken.
    ///
    /// An existing set is not reinitialized. A process that opens the set
    /// between its creation and initialization by another process can
    /// observe a counter of 0.
    pub fn create(&self) -> Result<Semaphore> {
        let perms = (self.mode & 0o777) as libc::c_int;
        let flags = libc::IPC_CREAT | libc::IPC_EXCL | perms;

        match Errno::result(unsafe { libc::semget(self.key.as_raw(), 1, flags) }) {
            Ok(raw) => {
                let sem = Semaphore::from_id(SemId::from_raw(raw));
                sem.init(self.initial_value)?;
                debug!(sem = %sem.id, key = %self.key, value = self.initial_value, "created semaphore");
                Ok(sem)
            }
            Err(Errno::EEXIST) => {
                let raw = unsafe { libc::semget(self.key.as_raw(), 1, perms) };
                let raw = Errno::result(raw).map_err(|source| Error::AllocationFailed {
                    context: format!("semget(key={})", self.key),
                    source,
                })?;
                let sem = Semaphore::from_id(SemId::from_raw(raw));
                debug!(sem = %sem.id, key = %self.key, "opened existing semaphore");
                Ok(sem)
            }
            Err(source) => Err(Error::AllocationFailed {
                context: format!("semget(key={}, IPC_CREAT | IPC_EXCL)", self.key),
                source,
            }),
        }
    }
}

/// Handle to a one-counter semaphore set.
///
/// Only the identifier is stored, so the handle is cheap to copy and can be
/// rebuilt in another process with [`Semaphore::from_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Semaphore {
    id: SemId,
}

impl Semaphore {
    /// Create a private semaphore with the given initial value
    pub fn create(initial_value: u32) -> Result<Self> {
        SemaphoreConf::new().initial_value(initial_value).create()
    }

    /// Use a semaphore created elsewhere
    pub fn from_id(id: SemId) -> Self {
        Self { id }
    }

    /// Get the semaphore set identifier
    pub fn id(&self) -> SemId {
        self.id
    }

    fn init(&self, value: u32) -> Result<()> {
        let val = libc::c_int::try_from(value).unwrap_or(libc::c_int::MAX);
        let ret = unsafe { libc::semctl(self.id.as_raw(), 0, libc::SETVAL, val) };
        Errno::result(ret).map(drop).map_err(|source| {
            Self::destroy_id(self.id);
            Error::AllocationFailed {
                context: format!("semctl({}, SETVAL, {})", self.id, value),
                source,
            }
        })
    }

    /// Remove the semaphore set. Errors are ignored.
    ///
    /// The set is removed for every process, so this handle, its copies and
    /// any handle built from the same id fail from now on.
    pub fn destroy(&self) {
        Self::destroy_id(self.id);
    }

    /// Remove a semaphore set by id. Errors are ignored.
    pub fn destroy_id(id: SemId) {
        let ret = unsafe { libc::semctl(id.as_raw(), 0, libc::IPC_RMID) };
        if let Err(e) = Errno::result(ret) {
            debug!(sem = %id, error = %e, "semctl(IPC_RMID) ignored");
        } else {
            debug!(sem = %id, "destroyed semaphore");
        }
    }

    fn semop(&self, op: libc::c_short, flags: libc::c_int) -> nix::Result<()> {
        let mut buf = libc::sembuf {
            sem_num: 0,
            sem_op: op,
            sem_flg: flags as libc::c_short,
        };
        Errno::result(unsafe { libc::semop(self.id.as_raw(), &mut buf, 1) }).map(drop)
    }

    /// Decrement the counter, blocking while it is 0
    pub fn lock(&self) -> Result<WaitOutcome> {
        trace!(sem = %self.id, "lock");
        match self.semop(-1, libc::SEM_UNDO) {
            Ok(()) => Ok(WaitOutcome::Completed),
            Err(Errno::EINTR) => Ok(WaitOutcome::Interrupted),
            Err(source) => Err(Error::LockFailed { id: self.id, source }),
        }
    }

    /// Decrement the counter if it is non-zero. Returns whether the lock
    /// was obtained; never blocks.
    pub fn try_lock(&self) -> Result<bool> {
        trace!(sem = %self.id, "try_lock");
        match self.semop(-1, libc::SEM_UNDO | libc::IPC_NOWAIT) {
            Ok(()) => Ok(true),
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => Ok(false),
            Err(source) => Err(Error::LockFailed { id: self.id, source }),
        }
    }

    /// Increment the counter, waking a blocked `lock` caller if any
    pub fn unlock(&self) -> Result<()> {
        trace!(sem = %self.id, "unlock");
        match self.semop(1, libc::SEM_UNDO) {
            Ok(()) | Err(Errno::EINTR) => Ok(()),
            Err(source) => Err(Error::UnlockFailed { id: self.id, source }),
        }
    }

    /// Block until the counter is exactly 0, without changing it
    pub fn wait_for_zero(&self) -> Result<WaitOutcome> {
        trace!(sem = %self.id, "wait_for_zero");
        match self.semop(0, 0) {
            Ok(()) => Ok(WaitOutcome::Completed),
            Err(Errno::EINTR) => Ok(WaitOutcome::Interrupted),
            Err(source) => Err(Error::WaitFailed { id: self.id, source }),
        }
    }

    /// Current counter value
    pub fn value(&self) -> Result<u32> {
        self.read(libc::GETVAL)
    }

    /// Number of callers blocked in [`lock`](Self::lock)
    pub fn waiters(&self) -> Result<u32> {
        self.read(libc::GETNCNT)
    }

    /// Number of callers blocked in [`wait_for_zero`](Self::wait_for_zero)
    pub fn zero_waiters(&self) -> Result<u32> {
        self.read(libc::GETZCNT)
    }

    fn read(&self, cmd: libc::c_int) -> Result<u32> {
        let ret = unsafe { libc::semctl(self.id.as_raw(), 0, cmd) };
        let val = Errno::result(ret).map_err(|source| Error::ReadFailed { id: self.id, source })?;
        Ok(val as u32)
    }

    /// Lock, retrying on signal interruption, and release when the guard
    /// goes out of scope
    pub fn acquire(&self) -> Result<SemaphoreGuard> {
        loop {
            match self.lock()? {
                WaitOutcome::Completed => return Ok(SemaphoreGuard::new(*self)),
                WaitOutcome::Interrupted => trace!(sem = %self.id, "lock interrupted, retrying"),
            }
        }
    }

    /// Non-blocking [`acquire`](Self::acquire)
    pub fn try_acquire(&self) -> Result<Option<SemaphoreGuard>> {
        Ok(self.try_lock()?.then(|| SemaphoreGuard::new(*self)))
    }
}
