use serde::{Deserialize, Serialize};

/// Closed set of permissions checked by the gate.
///
/// There is deliberately no wildcard variant: roles that hold "everything"
/// expand to [`Permission::ALL`] when their permission set is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewConnections,
    ManageConnections,
    TestConnections,
    TriggerSync,
    ViewSyncJobs,
    ViewInvoices,
    ValidateInvoices,
    SignInvoices,
    EditFirsFields,
    UpdateInvoicePayment,
    ViewAccessPoint,
    ManageAccessPoint,
    RevealAccessPointCredentials,
    ManageUsers,
    ManageTenants,
}

impl Permission {
    pub const ALL: [Permission; 15] = [
        Permission::ViewConnections,
        Permission::ManageConnections,
        Permission::TestConnections,
        Permission::TriggerSync,
        Permission::ViewSyncJobs,
        Permission::ViewInvoices,
        Permission::ValidateInvoices,
        Permission::SignInvoices,
        Permission::EditFirsFields,
        Permission::UpdateInvoicePayment,
        Permission::ViewAccessPoint,
        Permission::ManageAccessPoint,
        Permission::RevealAccessPointCredentials,
        Permission::ManageUsers,
        Permission::ManageTenants,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewConnections => "connections.view",
            Permission::ManageConnections => "connections.manage",
            Permission::TestConnections => "connections.test",
            Permission::TriggerSync => "sync.trigger",
            Permission::ViewSyncJobs => "sync.view",
            Permission::ViewInvoices => "invoices.view",
            Permission::ValidateInvoices => "invoices.firs.validate",
            Permission::SignInvoices => "invoices.firs.sign",
            Permission::EditFirsFields => "invoices.firs.edit",
            Permission::UpdateInvoicePayment => "invoices.payment.update",
            Permission::ViewAccessPoint => "access_point.view",
            Permission::ManageAccessPoint => "access_point.manage",
            Permission::RevealAccessPointCredentials => "access_point.credentials.reveal",
            Permission::ManageUsers => "users.manage",
            Permission::ManageTenants => "tenants.manage",
        }
    }

    /// Module the permission belongs to (first segment of its name).
    pub fn category(&self) -> &'static str {
        let name = self.as_str();
        name.split('.').next().unwrap_or(name)
    }

    /// Whether holding this permission allows changing state.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Permission::ViewConnections
                | Permission::ViewSyncJobs
                | Permission::ViewInvoices
                | Permission::ViewAccessPoint
        )
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_lists_every_permission_once() {
        let unique: HashSet<_> = Permission::ALL.iter().collect();
        assert_eq!(unique.len(), Permission::ALL.len());
    }

    #[test]
    fn category_is_first_name_segment() {
        assert_eq!(Permission::SignInvoices.category(), "invoices");
        assert_eq!(Permission::RevealAccessPointCredentials.category(), "access_point");
    }
}
