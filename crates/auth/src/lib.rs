//! `taxlink-auth`: permission gate for every mutating operation.
//!
//! Pure and synchronous: effective permissions are recomputed from the
//! caller's roles on every decision. The gate is advisory; backends
//! re-authorize independently.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{
    AuthorizationExplanation, AuthzError, authorize, authorize_for_tenant, explain_authorization,
};
pub use permissions::Permission;
pub use principal::AuthContext;
pub use roles::{Role, effective_permissions};
