//! Test support

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a test-friendly subscriber once; later calls are no-ops
pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("xipc_core=debug"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer().with_target(true))
        .with(filter)
        .try_init();
}
