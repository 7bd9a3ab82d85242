use serde::Serialize;
use thiserror::Error;

use taxlink_core::{TenantId, UserId};

use crate::{AuthContext, Permission, Role, effective_permissions};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(Permission),
}

/// Authorize `ctx` for `required`.
///
/// - No IO
/// - No caching: the permission set is rebuilt from `ctx.roles` every call
pub fn authorize(ctx: &AuthContext, required: Permission) -> Result<(), AuthzError> {
    if effective_permissions(&ctx.roles).contains(&required) {
        Ok(())
    } else {
        tracing::warn!(
            target: "audit",
            principal = %ctx.principal_id,
            tenant = %ctx.tenant_id,
            permission = %required,
            "authorization denied"
        );
        Err(AuthzError::Forbidden(required))
    }
}

/// Authorize `ctx` for `required` on a resource owned by `tenant_id`.
pub fn authorize_for_tenant(
    ctx: &AuthContext,
    tenant_id: TenantId,
    required: Permission,
) -> Result<(), AuthzError> {
    if ctx.tenant_id != tenant_id {
        tracing::warn!(
            target: "audit",
            principal = %ctx.principal_id,
            active_tenant = %ctx.tenant_id,
            resource_tenant = %tenant_id,
            "authorization denied: tenant mismatch"
        );
        return Err(AuthzError::TenantMismatch);
    }
    authorize(ctx, required)
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: Permission,
    pub granted: bool,
    pub reason: String,
    pub principal: PrincipalState,
    pub denial_reason: Option<DenialReason>,
}

/// Principal state at decision time.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub principal_id: UserId,
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub effective_permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    TenantMismatch,
    MissingPermission,
}

/// Explain why `ctx` would be allowed or denied `required` on a resource of
/// `tenant_id`.
pub fn explain_authorization(
    ctx: &AuthContext,
    tenant_id: TenantId,
    required: Permission,
) -> AuthorizationExplanation {
    let effective = effective_permissions(&ctx.roles);
    let principal = PrincipalState {
        principal_id: ctx.principal_id,
        tenant_id: ctx.tenant_id,
        roles: ctx.roles.clone(),
        effective_permissions: effective.iter().copied().collect(),
    };

    if ctx.tenant_id != tenant_id {
        return AuthorizationExplanation {
            required_permission: required,
            granted: false,
            reason: format!(
                "Tenant mismatch: principal acts in tenant {} but the resource belongs to tenant {}",
                ctx.tenant_id, tenant_id
            ),
            principal,
            denial_reason: Some(DenialReason {
                kind: DenialKind::TenantMismatch,
                message: "Principal is acting in a different tenant than the resource".to_string(),
                suggestions: vec![
                    "Switch the active tenant before retrying the operation".to_string(),
                ],
            }),
        };
    }

    if effective.contains(&required) {
        let granted_by: Vec<&str> = ctx
            .roles
            .iter()
            .filter(|r| r.permissions().contains(&required))
            .map(|r| r.as_str())
            .collect();

        return AuthorizationExplanation {
            required_permission: required,
            granted: true,
            reason: format!("Permission '{}' granted by role(s) {:?}", required, granted_by),
            principal,
            denial_reason: None,
        };
    }

    let granting_roles: Vec<&str> = Role::ALL
        .iter()
        .filter(|r| r.permissions().contains(&required))
        .map(|r| r.as_str())
        .collect();

    AuthorizationExplanation {
        required_permission: required,
        granted: false,
        reason: format!(
            "Principal does not hold '{}'. Current roles: {:?}",
            required,
            ctx.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>()
        ),
        principal,
        denial_reason: Some(DenialReason {
            kind: DenialKind::MissingPermission,
            message: format!("Missing required permission: '{}'", required),
            suggestions: vec![format!(
                "Assign one of the roles that grant '{}': {:?}",
                required, granting_roles
            )],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(roles: Vec<Role>) -> AuthContext {
        AuthContext::new(UserId::new(), TenantId::new(), roles)
    }

    #[test]
    fn company_user_is_forbidden_from_signing() {
        let ctx = ctx(vec![Role::CompanyUser]);
        assert_eq!(
            authorize(&ctx, Permission::SignInvoices),
            Err(AuthzError::Forbidden(Permission::SignInvoices))
        );
        assert!(authorize(&ctx, Permission::ValidateInvoices).is_ok());
    }

    #[test]
    fn role_change_is_visible_on_next_check() {
        let user = ctx(vec![Role::CompanyUser]);
        assert!(authorize(&user, Permission::ManageAccessPoint).is_err());

        let promoted = user.with_roles(vec![Role::CompanyAdmin]);
        assert!(authorize(&promoted, Permission::ManageAccessPoint).is_ok());
    }

    #[test]
    fn foreign_tenant_is_rejected_before_permissions() {
        let admin = ctx(vec![Role::SuperAdmin]);
        assert_eq!(
            authorize_for_tenant(&admin, TenantId::new(), Permission::ViewInvoices),
            Err(AuthzError::TenantMismatch)
        );
    }

    #[test]
    fn explanation_suggests_granting_roles() {
        let user = ctx(vec![Role::CompanyUser]);
        let explanation = explain_authorization(&user, user.tenant_id, Permission::SignInvoices);

        assert!(!explanation.granted);
        let denial = explanation.denial_reason.unwrap();
        assert_eq!(denial.kind, DenialKind::MissingPermission);
        assert!(denial.suggestions[0].contains("company_admin"));
        assert!(!denial.suggestions[0].contains("company_user"));
    }

    #[test]
    fn explanation_names_the_granting_role() {
        let admin = ctx(vec![Role::CompanyUser, Role::CompanyAdmin]);
        let explanation = explain_authorization(&admin, admin.tenant_id, Permission::SignInvoices);

        assert!(explanation.granted);
        assert!(explanation.reason.contains("company_admin"));
        assert!(explanation.denial_reason.is_none());
    }
}
