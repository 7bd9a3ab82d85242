//! Entity trait: records with a stable identity owned by a tenant.

use crate::id::TenantId;

/// Tenant-owned record with a stable identity.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Tenant that owns this record.
    fn tenant_id(&self) -> TenantId;

    /// Whether `tenant_id` may see this record.
    fn owned_by(&self, tenant_id: TenantId) -> bool {
        self.tenant_id() == tenant_id
    }
}
