//! Connection profile data model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use taxlink_core::{ProfileId, TenantId};

use crate::erp::{DatabaseLocation, ErpType};
use crate::negotiator::ConnectionTestResult;

/// Document family pulled from an ERP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Vendors,
    Customers,
    Products,
    Invoices,
    TaxCategories,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Vendors,
        EntityType::Customers,
        EntityType::Products,
        EntityType::Invoices,
        EntityType::TaxCategories,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Vendors => "vendors",
            EntityType::Customers => "customers",
            EntityType::Products => "products",
            EntityType::Invoices => "invoices",
            EntityType::TaxCategories => "tax_categories",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        EntityType::ALL.into_iter().find(|e| e.as_str() == s)
    }
}

impl core::fmt::Display for EntityType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

/// Which leg of a profile a connection test exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPath {
    Api,
    Database,
}

impl ConnectionPath {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionPath::Api => "API",
            ConnectionPath::Database => "database",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDetails {
    pub host: String,
    pub port: Option<u16>,
    pub protocol: Protocol,
    pub ssl_verify: bool,
    pub schema: Option<String>,
    /// Authoritative only for ERP types using [`DatabaseLocation::ServerDetails`].
    pub database: Option<String>,
    pub pool_alias: Option<String>,
    pub api_version: Option<String>,
}

impl ServerDetails {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            protocol: Protocol::Https,
            ssl_verify: true,
            schema: None,
            database: None,
            pool_alias: None,
            api_version: None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both username and password populated.
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbCredentials {
    pub username: String,
    pub password: String,
    /// Authoritative only for ERP types using [`DatabaseLocation::DbCredentials`].
    pub database: Option<String>,
}

impl DbCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            database: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

impl core::fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DbCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Per-entity read grants on the ERP side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadPermissions {
    pub vendors: bool,
    pub customers: bool,
    pub products: bool,
    pub invoices: bool,
    pub tax_categories: bool,
}

impl ReadPermissions {
    pub fn all() -> Self {
        Self {
            vendors: true,
            customers: true,
            products: true,
            invoices: true,
            tax_categories: true,
        }
    }

    pub fn allows(&self, entity: EntityType) -> bool {
        match entity {
            EntityType::Vendors => self.vendors,
            EntityType::Customers => self.customers,
            EntityType::Products => self.products,
            EntityType::Invoices => self.invoices,
            EntityType::TaxCategories => self.tax_categories,
        }
    }
}

impl Default for ReadPermissions {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    pub frequency_minutes: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            frequency_minutes: 60,
        }
    }
}

/// A tenant's connection to one ERP system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// `None` until persisted.
    pub id: Option<ProfileId>,
    pub tenant_id: TenantId,
    pub erp_type: ErpType,
    pub server_details: ServerDetails,
    pub api_credentials: Option<Credentials>,
    pub db_credentials: Option<DbCredentials>,
    pub read_permissions: ReadPermissions,
    pub sync_settings: SyncSettings,
    pub invoice_sync_start_date: NaiveDate,
    pub is_active: bool,
    /// Most recent connection test, if any.
    pub last_test: Option<ConnectionTestResult>,
}

impl ConnectionProfile {
    /// Unsaved, inactive profile with default settings.
    pub fn draft(
        tenant_id: TenantId,
        erp_type: ErpType,
        server_details: ServerDetails,
        invoice_sync_start_date: NaiveDate,
    ) -> Self {
        Self {
            id: None,
            tenant_id,
            erp_type,
            server_details,
            api_credentials: None,
            db_credentials: None,
            read_permissions: ReadPermissions::all(),
            sync_settings: SyncSettings::default(),
            invoice_sync_start_date,
            is_active: false,
            last_test: None,
        }
    }

    pub fn with_api_credentials(mut self, credentials: Credentials) -> Self {
        self.api_credentials = Some(credentials);
        self
    }

    pub fn with_db_credentials(mut self, credentials: DbCredentials) -> Self {
        self.db_credentials = Some(credentials);
        self
    }

    pub fn has_api_credentials(&self) -> bool {
        self.api_credentials.as_ref().is_some_and(Credentials::is_complete)
    }

    pub fn has_db_credentials(&self) -> bool {
        self.db_credentials.as_ref().is_some_and(DbCredentials::is_complete)
    }

    /// Database name read from the location authoritative for this ERP type.
    pub fn database_name(&self) -> Option<&str> {
        let name = match self.erp_type.schema().database_location {
            DatabaseLocation::ServerDetails => self.server_details.database.as_deref(),
            DatabaseLocation::DbCredentials => self
                .db_credentials
                .as_ref()
                .and_then(|c| c.database.as_deref()),
        };
        name.filter(|n| !n.trim().is_empty())
    }

    /// Configured port, or the ERP type's default for `path`.
    pub fn port_for(&self, path: ConnectionPath) -> u16 {
        let schema = self.erp_type.schema();
        self.server_details.port.unwrap_or(match path {
            ConnectionPath::Api => schema.api.map_or(schema.default_db_port, |a| a.default_port),
            ConnectionPath::Database => schema.default_db_port,
        })
    }
}
