//! Single active access-point provider per tenant.
//!
//! Activate, rotate and deactivate are serialized per tenant. Each one
//! re-reads the provider list inside the tenant lock right before it mutates,
//! so a rotate can never land on a provider that an activate just replaced.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use taxlink_auth::{AuthContext, AuthzError, Permission, authorize_for_tenant};
use taxlink_core::{DomainError, ProviderId, TenantId, ValidationError};

use crate::credentials::{CredentialRead, CredentialView, ProviderCredentials, mask};
use crate::provider::AccessPointProvider;

/// Provider backend failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderBackendError {
    #[error("provider {0} not found")]
    NotFound(ProviderId),
    #[error("provider backend unavailable: {0}")]
    Unavailable(String),
}

/// Authoritative store of a tenant's providers and their credentials.
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<AccessPointProvider>, ProviderBackendError>;

    async fn credentials(
        &self,
        tenant_id: TenantId,
        provider_id: ProviderId,
        view: CredentialView,
    ) -> Result<BTreeMap<String, String>, ProviderBackendError>;

    /// Make `provider_id` the active provider, deactivating any other, and
    /// store `credentials` when given. One logical operation.
    async fn activate(
        &self,
        tenant_id: TenantId,
        provider_id: ProviderId,
        credentials: Option<&ProviderCredentials>,
    ) -> Result<AccessPointProvider, ProviderBackendError>;

    async fn update_credentials(
        &self,
        tenant_id: TenantId,
        provider_id: ProviderId,
        credentials: &ProviderCredentials,
    ) -> Result<AccessPointProvider, ProviderBackendError>;

    async fn deactivate(&self, tenant_id: TenantId, provider_id: ProviderId) -> Result<(), ProviderBackendError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Unauthorized(#[from] AuthzError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("provider {0} not found")]
    NotFound(ProviderId),
    #[error("provider {0} is not the active provider")]
    NotActive(ProviderId),
    #[error("provider backend unavailable: {0}")]
    Backend(String),
}

impl From<ProviderBackendError> for VaultError {
    fn from(e: ProviderBackendError) -> Self {
        match e {
            ProviderBackendError::NotFound(id) => VaultError::NotFound(id),
            ProviderBackendError::Unavailable(msg) => VaultError::Backend(msg),
        }
    }
}

pub struct CredentialVault {
    backend: Arc<dyn ProviderBackend>,
    locks: Mutex<HashMap<TenantId, Arc<tokio::sync::Mutex<()>>>>,
}

impl CredentialVault {
    pub fn new(backend: Arc<dyn ProviderBackend>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn providers(&self, ctx: &AuthContext) -> Result<Vec<AccessPointProvider>, VaultError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ViewAccessPoint)?;
        Ok(self.backend.list(ctx.tenant_id).await?)
    }

    pub async fn active(&self, ctx: &AuthContext) -> Result<Option<AccessPointProvider>, VaultError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ViewAccessPoint)?;
        let providers = self.backend.list(ctx.tenant_id).await?;
        Ok(providers.into_iter().find(|p| p.is_active))
    }

    /// Make `provider_id` the tenant's only active provider.
    ///
    /// `credentials` may be omitted only when the provider already has some.
    pub async fn activate(
        &self,
        ctx: &AuthContext,
        provider_id: ProviderId,
        credentials: Option<BTreeMap<String, String>>,
    ) -> Result<AccessPointProvider, VaultError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ManageAccessPoint)?;
        let lock = self.tenant_lock(ctx.tenant_id);
        let _serialized = lock.lock().await;

        let providers = self.backend.list(ctx.tenant_id).await?;
        let provider = providers
            .iter()
            .find(|p| p.id == provider_id)
            .ok_or(VaultError::NotFound(provider_id))?;

        let credentials = match credentials {
            Some(fields) => Some(ProviderCredentials::from_fields(
                provider.code.credential_shape(),
                &fields,
            )?),
            None if provider.has_credentials => None,
            None => {
                return Err(ValidationError::field(
                    "credentials",
                    format!("{} has no saved credentials; provide them to activate", provider.name),
                )
                .into());
            }
        };

        if provider.is_active && credentials.is_none() {
            return Ok(provider.clone());
        }
        let previous = providers.iter().find(|p| p.is_active).map(|p| p.id);

        self.backend
            .activate(ctx.tenant_id, provider_id, credentials.as_ref())
            .await?;

        let after = self.backend.list(ctx.tenant_id).await?;
        let active: Vec<&AccessPointProvider> = after.iter().filter(|p| p.is_active).collect();
        let activated = match active.as_slice() {
            [only] if only.id == provider_id => (*only).clone(),
            _ => {
                tracing::error!(
                    tenant = %ctx.tenant_id,
                    provider = %provider_id,
                    active = active.len(),
                    "access point activation left an inconsistent provider set"
                );
                return Err(DomainError::invariant(format!(
                    "expected exactly one active provider ({provider_id}), found {}",
                    active.len()
                ))
                .into());
            }
        };

        tracing::info!(
            tenant = %ctx.tenant_id,
            provider = %provider_id,
            code = %activated.code,
            previous = ?previous,
            "access point provider activated"
        );
        Ok(activated)
    }

    /// Replace the credentials of the active provider.
    pub async fn rotate(
        &self,
        ctx: &AuthContext,
        provider_id: ProviderId,
        credentials: BTreeMap<String, String>,
    ) -> Result<AccessPointProvider, VaultError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ManageAccessPoint)?;
        let lock = self.tenant_lock(ctx.tenant_id);
        let _serialized = lock.lock().await;

        let providers = self.backend.list(ctx.tenant_id).await?;
        let provider = providers
            .iter()
            .find(|p| p.id == provider_id)
            .ok_or(VaultError::NotFound(provider_id))?;
        if !provider.is_active {
            tracing::warn!(provider = %provider_id, "rotation refused: provider is not active");
            return Err(VaultError::NotActive(provider_id));
        }

        let credentials = ProviderCredentials::from_fields(provider.code.credential_shape(), &credentials)?;
        let updated = self
            .backend
            .update_credentials(ctx.tenant_id, provider_id, &credentials)
            .await?;
        tracing::info!(tenant = %ctx.tenant_id, provider = %provider_id, "access point credentials rotated");
        Ok(updated)
    }

    /// Deactivate the active provider. Returns it, or `None` if none was active.
    pub async fn deactivate(&self, ctx: &AuthContext) -> Result<Option<AccessPointProvider>, VaultError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ManageAccessPoint)?;
        let lock = self.tenant_lock(ctx.tenant_id);
        let _serialized = lock.lock().await;

        let providers = self.backend.list(ctx.tenant_id).await?;
        let Some(active) = providers.into_iter().find(|p| p.is_active) else {
            return Ok(None);
        };
        self.backend.deactivate(ctx.tenant_id, active.id).await?;
        tracing::info!(tenant = %ctx.tenant_id, provider = %active.id, "access point provider deactivated");
        Ok(Some(AccessPointProvider {
            is_active: false,
            ..active
        }))
    }

    /// Credentials of the active provider, or `None` if none is active.
    pub async fn active_credentials(
        &self,
        ctx: &AuthContext,
        view: CredentialView,
    ) -> Result<Option<CredentialRead>, VaultError> {
        let permission = match view {
            CredentialView::Masked => Permission::ViewAccessPoint,
            CredentialView::Unmasked => Permission::RevealAccessPointCredentials,
        };
        authorize_for_tenant(ctx, ctx.tenant_id, permission)?;

        let providers = self.backend.list(ctx.tenant_id).await?;
        let Some(active) = providers.into_iter().find(|p| p.is_active) else {
            return Ok(None);
        };

        match view {
            CredentialView::Masked => {
                let fields = self
                    .backend
                    .credentials(ctx.tenant_id, active.id, CredentialView::Masked)
                    .await?
                    .into_iter()
                    .map(|(k, v)| {
                        let masked = mask(&v);
                        (k, masked)
                    })
                    .collect();
                Ok(Some(CredentialRead {
                    provider_id: active.id,
                    view,
                    fields,
                    unavailable: false,
                }))
            }
            CredentialView::Unmasked => {
                tracing::info!(
                    target: "audit",
                    principal = %ctx.principal_id,
                    tenant = %ctx.tenant_id,
                    provider = %active.id,
                    "unmasked access point credentials requested"
                );
                let read = self
                    .backend
                    .credentials(ctx.tenant_id, active.id, CredentialView::Unmasked)
                    .await;
                let (fields, unavailable) = match read {
                    Ok(fields) => (fields, false),
                    Err(e) => {
                        tracing::warn!(
                            target: "audit",
                            provider = %active.id,
                            error = %e,
                            "unmasked credential read failed; returning blank fields"
                        );
                        let blank = active
                            .code
                            .credential_shape()
                            .fields()
                            .iter()
                            .map(|name| (name.to_string(), String::new()))
                            .collect();
                        (blank, true)
                    }
                };
                Ok(Some(CredentialRead {
                    provider_id: active.id,
                    view,
                    fields,
                    unavailable,
                }))
            }
        }
    }

    fn tenant_lock(&self, tenant_id: TenantId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(tenant_id).or_default().clone()
    }
}
