//! Process-wide tracing setup shared by the lapse binaries.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogFormat, ENV_LOG_FORMAT};

/// Initialize process-wide tracing with the format named by
/// `LAPSE_LOG_FORMAT` (JSON when unset).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    crate::tracing::init(LogFormat::from_env());
}
