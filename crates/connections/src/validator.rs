//! Structural and semantic validation of a connection profile.
//!
//! Local and deterministic: the reference date is supplied by the caller and
//! nothing here touches the network.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use taxlink_core::ValidationError;

use crate::erp::{DatabaseLocation, ErpType};
use crate::profile::{ConnectionProfile, Protocol};

/// A change the validator applied to the submitted profile.
///
/// Returned alongside the profile so the operator sees it instead of the
/// value silently changing on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAdjustment {
    pub field: String,
    pub from: String,
    pub to: String,
    pub reason: String,
}

/// Profile that passed validation, normalized for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedProfile {
    pub profile: ConnectionProfile,
    pub adjustments: Vec<FieldAdjustment>,
}

/// Validate `profile` against the rules of `erp_type`.
pub fn validate(
    erp_type: ErpType,
    profile: &ConnectionProfile,
    today: NaiveDate,
) -> Result<ValidatedProfile, ValidationError> {
    let schema = erp_type.schema();
    let mut errors = ValidationError::new();

    if profile.erp_type != erp_type {
        errors.add(
            "erp_type",
            format!(
                "profile is tagged {} but was submitted as {}",
                profile.erp_type, erp_type
            ),
        );
    }

    let server = &profile.server_details;
    if server.host.trim().is_empty() {
        errors.add("server_details.host", "host is required");
    }
    if server.port == Some(0) {
        errors.add("server_details.port", "port must be between 1 and 65535");
    }

    if let Some(api) = &profile.api_credentials {
        if !schema.supports_api() {
            errors.add(
                "api_credentials",
                format!("{} does not support API connections", schema.display_name),
            );
        } else {
            errors.merge_prefixed(
                "api_credentials",
                credential_errors(&api.username, &api.password),
            );
            let alias_missing = server
                .pool_alias
                .as_deref()
                .is_none_or(|alias| alias.trim().is_empty());
            if schema.requires_pool_alias() && alias_missing {
                errors.add(
                    "server_details.pool_alias",
                    format!(
                        "pool alias is required for {} API connections",
                        schema.display_name
                    ),
                );
            }
        }
    }

    if let Some(db) = &profile.db_credentials {
        errors.merge_prefixed("db_credentials", credential_errors(&db.username, &db.password));
    }

    let api_usable = schema.supports_api() && profile.has_api_credentials();
    if !api_usable && !profile.has_db_credentials() {
        errors.add(
            "credentials",
            "API or database credentials (username and password) are required",
        );
    }

    match schema.database_location {
        DatabaseLocation::ServerDetails => {
            if profile.database_name().is_none() {
                errors.add(
                    "server_details.database",
                    format!("database is required for {}", schema.display_name),
                );
            }
        }
        DatabaseLocation::DbCredentials => {
            if profile.db_credentials.is_some() && profile.database_name().is_none() {
                errors.add(
                    "db_credentials.database",
                    format!(
                        "database is required for {} database connections",
                        schema.display_name
                    ),
                );
            }
        }
    }

    if profile.sync_settings.frequency_minutes < 1 {
        errors.add(
            "sync_settings.frequency_minutes",
            "sync frequency must be at least 1 minute",
        );
    }

    if profile.invoice_sync_start_date > today {
        errors.add(
            "invoice_sync_start_date",
            "invoice sync start date cannot be in the future",
        );
    }

    errors.into_result()?;

    let mut normalized = profile.clone();
    let mut adjustments = Vec::new();
    if normalized.server_details.protocol == Protocol::Http && normalized.server_details.ssl_verify {
        normalized.server_details.ssl_verify = false;
        adjustments.push(FieldAdjustment {
            field: "server_details.ssl_verify".to_string(),
            from: "true".to_string(),
            to: "false".to_string(),
            reason: "SSL verification is not available over plain HTTP".to_string(),
        });
    }

    Ok(ValidatedProfile {
        profile: normalized,
        adjustments,
    })
}

fn credential_errors(username: &str, password: &str) -> ValidationError {
    let mut errors = ValidationError::new();
    if username.trim().is_empty() {
        errors.add("username", "username is required");
    }
    if password.is_empty() {
        errors.add("password", "password is required");
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Credentials, DbCredentials, ServerDetails};
    use proptest::prelude::*;
    use taxlink_core::TenantId;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    fn draft(erp_type: ErpType) -> ConnectionProfile {
        ConnectionProfile::draft(
            TenantId::new(),
            erp_type,
            ServerDetails::new("h"),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        )
    }

    #[test]
    fn sage_api_credentials_without_pool_alias_is_rejected() {
        let mut profile = draft(ErpType::SageX3).with_api_credentials(Credentials::new("u", "p"));
        profile.server_details.pool_alias = Some(String::new());

        let err = validate(ErpType::SageX3, &profile, today()).unwrap_err();
        assert!(err.contains("server_details.pool_alias"));
    }

    #[test]
    fn sage_database_only_does_not_need_pool_alias() {
        let profile = draft(ErpType::SageX3)
            .with_db_credentials(DbCredentials::new("sa", "pw").with_database("X3"));
        assert!(validate(ErpType::SageX3, &profile, today()).is_ok());
    }

    #[test]
    fn partial_credentials_produce_nested_field_errors() {
        let mut profile = draft(ErpType::Odoo).with_api_credentials(Credentials::new("admin", ""));
        profile.server_details.database = Some("odoo".to_string());

        let err = validate(ErpType::Odoo, &profile, today()).unwrap_err();
        assert!(err.contains("api_credentials.password"));
        assert!(err.contains("credentials"));
        assert!(!err.contains("api_credentials.username"));
    }

    #[test]
    fn database_location_depends_on_erp_type() {
        // SAP reads the database from server details, not from db credentials.
        let profile = draft(ErpType::SapBusinessOne)
            .with_db_credentials(DbCredentials::new("sa", "pw").with_database("SBO"));
        let err = validate(ErpType::SapBusinessOne, &profile, today()).unwrap_err();
        assert!(err.contains("server_details.database"));

        // Dynamics reads it from db credentials.
        let mut profile = draft(ErpType::DynamicsNav)
            .with_db_credentials(DbCredentials::new("sa", "pw"));
        profile.server_details.database = Some("ignored".to_string());
        let err = validate(ErpType::DynamicsNav, &profile, today()).unwrap_err();
        assert!(err.contains("db_credentials.database"));
    }

    #[test]
    fn database_only_erp_rejects_api_credentials() {
        let profile = draft(ErpType::DynamicsNav)
            .with_api_credentials(Credentials::new("u", "p"))
            .with_db_credentials(DbCredentials::new("sa", "pw").with_database("NAV"));
        let err = validate(ErpType::DynamicsNav, &profile, today()).unwrap_err();
        assert!(err.contains("api_credentials"));
    }

    #[test]
    fn http_forces_ssl_verify_off_and_reports_it() {
        let mut profile = draft(ErpType::Odoo).with_api_credentials(Credentials::new("u", "p"));
        profile.server_details.database = Some("odoo".to_string());
        profile.server_details.protocol = Protocol::Http;
        profile.server_details.ssl_verify = true;

        let validated = validate(ErpType::Odoo, &profile, today()).unwrap();
        assert!(!validated.profile.server_details.ssl_verify);
        assert_eq!(validated.adjustments.len(), 1);
        assert_eq!(validated.adjustments[0].field, "server_details.ssl_verify");
    }

    #[test]
    fn https_keeps_the_operator_choice() {
        let mut profile = draft(ErpType::Odoo).with_api_credentials(Credentials::new("u", "p"));
        profile.server_details.database = Some("odoo".to_string());
        profile.server_details.ssl_verify = false;

        let validated = validate(ErpType::Odoo, &profile, today()).unwrap();
        assert!(!validated.profile.server_details.ssl_verify);
        assert!(validated.adjustments.is_empty());
    }

    #[test]
    fn future_start_date_and_zero_frequency_are_rejected() {
        let mut profile = draft(ErpType::SageX3)
            .with_db_credentials(DbCredentials::new("sa", "pw").with_database("X3"));
        profile.invoice_sync_start_date = today().succ_opt().unwrap();
        profile.sync_settings.frequency_minutes = 0;
        profile.server_details.host = "  ".to_string();

        let err = validate(ErpType::SageX3, &profile, today()).unwrap_err();
        assert!(err.contains("invoice_sync_start_date"));
        assert!(err.contains("sync_settings.frequency_minutes"));
        assert!(err.contains("server_details.host"));
    }

    #[test]
    fn mismatched_erp_type_is_a_field_error() {
        let profile = draft(ErpType::SageX3)
            .with_db_credentials(DbCredentials::new("sa", "pw").with_database("X3"));
        let err = validate(ErpType::Odoo, &profile, today()).unwrap_err();
        assert!(err.contains("erp_type"));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: validation is a pure function of its inputs.
        #[test]
        fn validation_is_deterministic(
            erp_idx in 0usize..4,
            host in "[a-z]{0,6}",
            api_user in proptest::option::of("[a-z]{0,3}"),
            db_user in proptest::option::of("[a-z]{0,3}"),
            alias in proptest::option::of("[A-Z]{0,3}"),
            frequency in 0u32..3,
            http in any::<bool>(),
        ) {
            let erp_type = ErpType::ALL[erp_idx];
            let mut profile = draft(erp_type);
            profile.server_details.host = host;
            profile.server_details.pool_alias = alias;
            profile.server_details.protocol = if http { Protocol::Http } else { Protocol::Https };
            profile.sync_settings.frequency_minutes = frequency;
            profile.api_credentials = api_user.map(|u| Credentials::new(u, "pw"));
            profile.db_credentials = db_user.map(|u| DbCredentials::new(u, "pw").with_database("db"));

            let first = validate(erp_type, &profile, today());
            let second = validate(erp_type, &profile, today());
            prop_assert_eq!(first, second);
        }
    }
}
