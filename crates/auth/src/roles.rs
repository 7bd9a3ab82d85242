use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role assigned to a principal within a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    CompanyAdmin,
    CompanyUser,
    Company,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::SuperAdmin,
        Role::CompanyAdmin,
        Role::CompanyUser,
        Role::Company,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::CompanyAdmin => "company_admin",
            Role::CompanyUser => "company_user",
            Role::Company => "company",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "Platform operator with every permission",
            Role::CompanyAdmin => "Tenant administrator: connections, sync, compliance and access point",
            Role::CompanyUser => "Tenant staff with read access and invoice validation",
            Role::Company => "Tenant account: connections, sync and the compliance workflow",
        }
    }

    /// Concrete permission set of this role.
    ///
    /// `SuperAdmin` expands to the full closed enum here, so no sentinel value
    /// ever reaches a permission check.
    pub fn permissions(&self) -> BTreeSet<Permission> {
        use Permission::*;

        match self {
            Role::SuperAdmin => Permission::ALL.into_iter().collect(),
            Role::CompanyAdmin => Permission::ALL
                .into_iter()
                .filter(|p| *p != ManageTenants)
                .collect(),
            Role::Company => [
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
            ]
            .into_iter()
            .collect(),
            Role::CompanyUser => [
                ViewConnections,
                ViewSyncJobs,
                ViewInvoices,
                ValidateInvoices,
                ViewAccessPoint,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Union of the permissions of every role in `roles`.
pub fn effective_permissions(roles: &[Role]) -> BTreeSet<Permission> {
    roles.iter().flat_map(|role| role.permissions()).collect()
}
