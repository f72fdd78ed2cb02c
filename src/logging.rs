use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{QuadError, Result};

/// Installs a `fmt` subscriber filtered by `level` (any `EnvFilter`
/// directive, e.g. `"info"` or `"quadstore=trace"`).
///
/// A subscriber that is already installed is left in place.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| QuadError::Config(format!("invalid log level: {e}")))?;
    if fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .is_err()
    {
        tracing::debug!("logging.already_initialized");
    }
    Ok(())
}
