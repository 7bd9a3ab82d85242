//! Process-wide logging setup shared by the bridge binaries.

/// Tracing subscriber configuration.
pub mod tracing;

pub use crate::tracing::{LogFormat, LogSettings};

/// Initialize JSON logging filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init(&LogSettings::default());
}
