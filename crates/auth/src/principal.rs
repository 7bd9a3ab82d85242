use serde::{Deserialize, Serialize};

use taxlink_core::{TenantId, UserId};

use crate::Role;

/// Explicit authorization context passed into every gated call.
///
/// Holds roles only; permissions are derived from them per decision so a
/// role change is visible on the very next check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub principal_id: UserId,
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
}

impl AuthContext {
    pub fn new(principal_id: UserId, tenant_id: TenantId, roles: Vec<Role>) -> Self {
        Self {
            principal_id,
            tenant_id,
            roles,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Same principal acting with a different role assignment.
    pub fn with_roles(&self, roles: Vec<Role>) -> Self {
        Self {
            roles,
            ..self.clone()
        }
    }
}
