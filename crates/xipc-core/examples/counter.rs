//! Forked workers bump a counter in a shared segment under a semaphore.
//!
//! Usage:
//! ```bash
//! RUST_LOG=xipc_core=debug cargo run --example counter
//! ```

use nix::sys::wait::waitpid;
use nix::unistd::{fork, ForkResult};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use xipc_core::{Semaphore, SharedRegion};

const WORKERS: usize = 4;
const ITERS: u64 = 10_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("xipc_core=debug"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    let id = SharedRegion::create(std::mem::size_of::<u64>())?;
    let mut region = SharedRegion::attach(id, std::mem::size_of::<u64>())?;
    let sem = Semaphore::create(1)?;
    println!("segment {id}, semaphore {}", sem.id());

    let counter = region.as_mut_ptr() as *mut u64;
    let mut children = Vec::with_capacity(WORKERS);

    for _ in 0..WORKERS {
        match unsafe { fork() }? {
            ForkResult::Child => {
                for _ in 0..ITERS {
                    let _guard = sem.acquire()?;
                    unsafe { counter.write_volatile(counter.read_volatile() + 1) };
                }
                unsafe { libc::_exit(0) };
            }
            ForkResult::Parent { child } => children.push(child),
        }
    }

    for child in children {
        waitpid(child, None)?;
    }

    let total = unsafe { counter.read_volatile() };
    println!("counter = {total} (expected {})", WORKERS as u64 * ITERS);

    region.detach()?;
    sem.destroy();
    Ok(())
}
