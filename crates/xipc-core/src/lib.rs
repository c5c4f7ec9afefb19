//! xipc - Cross-process shared memory and semaphores on System V IPC

pub mod error;
pub mod guard;
pub mod ipc;
pub mod sem;
pub mod shm;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use guard::SemaphoreGuard;
pub use ipc::{IpcKey, SemId, ShmId, DEFAULT_SEM_MODE, DEFAULT_SHM_MODE};
pub use sem::{Semaphore, SemaphoreConf, WaitOutcome};
pub use shm::{RegionConf, SegmentInfo, SharedRegion};
