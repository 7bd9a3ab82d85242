//! Infrastructure layer: configuration, in-memory collaborators and the
//! platform facade that wires the services together.

pub mod config;
pub mod memory;
pub mod platform;

pub use config::BridgeConfig;
pub use memory::InMemoryCollaborators;
pub use platform::{Collaborators, JobOutcome, Platform, PlatformError, SyncRun};
