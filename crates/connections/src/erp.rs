//! Supported ERP systems and the field requirements each one carries.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use taxlink_core::DomainError;

/// ERP system behind a connection profile.
///
/// Each variant owns an [`ErpSchema`]; validation and negotiation dispatch on
/// the variant instead of probing which fields happen to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErpType {
    /// Sage X3: web-service API addressed through a pool alias, SQL Server fallback.
    SageX3,
    /// SAP Business One: service layer API, company database on the server.
    SapBusinessOne,
    /// Odoo: RPC API, database selected on the server.
    Odoo,
    /// Microsoft Dynamics NAV: database access only.
    DynamicsNav,
}

/// Where the authoritative database name lives for an ERP type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseLocation {
    /// `server_details.database`; required for every connection path.
    ServerDetails,
    /// `db_credentials.database`; required whenever database credentials are supplied.
    DbCredentials,
}

/// API-side requirements of an ERP type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiSchema {
    pub requires_pool_alias: bool,
    pub default_port: u16,
}

/// Required-field set of one ERP type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErpSchema {
    pub display_name: &'static str,
    /// `None` for database-only systems.
    pub api: Option<ApiSchema>,
    pub database_location: DatabaseLocation,
    pub default_db_port: u16,
}

impl ErpSchema {
    pub fn supports_api(&self) -> bool {
        self.api.is_some()
    }

    pub fn requires_pool_alias(&self) -> bool {
        self.api.is_some_and(|api| api.requires_pool_alias)
    }
}

impl ErpType {
    pub const ALL: [ErpType; 4] = [
        ErpType::SageX3,
        ErpType::SapBusinessOne,
        ErpType::Odoo,
        ErpType::DynamicsNav,
    ];

    pub fn schema(&self) -> ErpSchema {
        match self {
            ErpType::SageX3 => ErpSchema {
                display_name: "Sage X3",
                api: Some(ApiSchema {
                    requires_pool_alias: true,
                    default_port: 8124,
                }),
                database_location: DatabaseLocation::DbCredentials,
                default_db_port: 1433,
            },
            ErpType::SapBusinessOne => ErpSchema {
                display_name: "SAP Business One",
                api: Some(ApiSchema {
                    requires_pool_alias: false,
                    default_port: 50000,
                }),
                database_location: DatabaseLocation::ServerDetails,
                default_db_port: 30015,
            },
            ErpType::Odoo => ErpSchema {
                display_name: "Odoo",
                api: Some(ApiSchema {
                    requires_pool_alias: false,
                    default_port: 8069,
                }),
                database_location: DatabaseLocation::ServerDetails,
                default_db_port: 5432,
            },
            ErpType::DynamicsNav => ErpSchema {
                display_name: "Microsoft Dynamics NAV",
                api: None,
                database_location: DatabaseLocation::DbCredentials,
                default_db_port: 1433,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErpType::SageX3 => "sageX3",
            ErpType::SapBusinessOne => "sapBusinessOne",
            ErpType::Odoo => "odoo",
            ErpType::DynamicsNav => "dynamicsNav",
        }
    }
}

impl core::fmt::Display for ErpType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErpType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErpType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::invalid_id(format!("unknown erp type '{s}'")))
    }
}
