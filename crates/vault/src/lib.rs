//! Access-point provider selection and credential custody.
//!
//! A tenant relays signed invoices through at most one active access-point
//! provider. Secrets never leave this crate unmasked except through an
//! audited read.

pub mod adapter;
pub mod credentials;
pub mod provider;

pub use adapter::{CredentialVault, ProviderBackend, ProviderBackendError, VaultError};
pub use credentials::{CredentialRead, CredentialView, ProviderCredentials, VISIBLE_SUFFIX, mask};
pub use provider::{AccessPointProvider, CredentialShape, ProviderCode};
