//! RAII semaphore guard

use crate::sem::Semaphore;
use crate::Result;
use tracing::warn;

/// Holds one unit of a [`Semaphore`] and gives it back on drop
#[must_use = "the semaphore is released as soon as the guard is dropped"]
pub struct SemaphoreGuard {
    sem: Semaphore,
    /// Whether this guard still owns the release responsibility
    should_release: bool,
}

impl SemaphoreGuard {
    pub(crate) fn new(sem: Semaphore) -> Self {
        Self {
            sem,
            should_release: true,
        }
    }

    /// Get the guarded semaphore
    pub fn semaphore(&self) -> Semaphore {
        self.sem
    }

    /// Release now and report the result
    pub fn release(mut self) -> Result<()> {
        self.should_release = false;
        self.sem.unlock()
    }

    /// Keep the semaphore held after the guard is gone.
    ///
    /// The kernel still gives it back when this process exits.
    pub fn forget(mut self) {
        self.should_release = false;
    }
}

impl Drop for SemaphoreGuard {
    fn drop(&mut self) {
        if self.should_release {
            if let Err(e) = self.sem.unlock() {
                warn!(sem = %self.sem.id(), error = %e, "failed to release semaphore on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_releases() {
        let sem = Semaphore::create(1).unwrap();
        {
            let guard = sem.acquire().unwrap();
            assert_eq!(guard.semaphore(), sem);
            assert_eq!(sem.value().unwrap(), 0);
        }
        assert_eq!(sem.value().unwrap(), 1);
        sem.destroy();
    }

    #[test]
    fn test_release_on_early_return() {
        fn fallible(sem: &Semaphore) -> std::result::Result<(), &'static str> {
            let _guard = sem.acquire().map_err(|_| "acquire")?;
            Err("bail out while holding the lock")
        }

        let sem = Semaphore::create(1).unwrap();
        assert!(fallible(&sem).is_err());
        assert_eq!(sem.value().unwrap(), 1);
        sem.destroy();
    }

    #[test]
    fn test_explicit_release() {
        let sem = Semaphore::create(1).unwrap();
        let guard = sem.acquire().unwrap();
        guard.release().unwrap();
        assert_eq!(sem.value().unwrap(), 1);
        sem.destroy();
    }

    #[test]
    fn test_try_acquire_when_held() {
        let sem = Semaphore::create(1).unwrap();
        let guard = sem.try_acquire().unwrap().expect("lock should be free");
        assert!(sem.try_acquire().unwrap().is_none());
        drop(guard);
        assert!(sem.try_acquire().unwrap().is_some());
        assert_eq!(sem.value().unwrap(), 1);
        sem.destroy();
    }

    #[test]
    fn test_forget_keeps_lock() {
        let sem = Semaphore::create(1).unwrap();
        sem.acquire().unwrap().forget();
        assert_eq!(sem.value().unwrap(), 0);
        sem.unlock().unwrap();
        sem.destroy();
    }
}
