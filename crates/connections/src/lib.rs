//! ERP connection profiles: validation, connection negotiation and the
//! profile service that ties them to the profile store.
//!
//! Validation is pure and local. Negotiation is the only part that reaches
//! the network, through the [`ConnectionProber`] collaborator.

pub mod erp;
pub mod error;
pub mod negotiator;
pub mod profile;
pub mod service;
pub mod validator;

pub use erp::{DatabaseLocation, ErpSchema, ErpType};
pub use error::{ConnectionError, StoreError};
pub use negotiator::{ConnectionNegotiator, ConnectionProber, ConnectionTestResult, TestSubject};
pub use profile::{
    ConnectionPath, ConnectionProfile, Credentials, DbCredentials, EntityType, Protocol,
    ReadPermissions, ServerDetails, SyncSettings,
};
pub use service::{ConnectionService, JobActivity, ProfileStore, SavedProfile};
pub use validator::{FieldAdjustment, ValidatedProfile, validate};
