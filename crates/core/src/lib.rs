//! `taxlink-core`: shared building blocks for the integration and compliance crates.
//!
//! Pure types only: identifiers, the error model and the duplicate-submission guard.

pub mod entity;
pub mod error;
pub mod id;
pub mod inflight;

pub use entity::Entity;
pub use error::{DomainError, DomainResult, ValidationError};
pub use id::{InvoiceId, LineItemId, ProfileId, ProviderId, SyncJobId, TenantId, UserId};
pub use inflight::{InFlight, InFlightGuard};
