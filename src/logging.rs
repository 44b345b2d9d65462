//! Log subscriber setup for binaries and tests.

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{PageSyncError, Result};

/// Installs a global `tracing` subscriber filtered by `level`.
///
/// `level` accepts any `EnvFilter` directive, e.g. `info` or
/// `pagesync::primitives::concurrency=debug`.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| PageSyncError::InvalidArgument(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| PageSyncError::InvalidArgument("logging already initialized".into()))
}
