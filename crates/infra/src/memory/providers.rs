use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use taxlink_core::{Entity, ProviderId, TenantId};
use taxlink_vault::{
    AccessPointProvider, CredentialView, ProviderBackend, ProviderBackendError, ProviderCredentials,
    mask,
};

/// Provider registry with secrets held in memory.
#[derive(Debug, Default)]
pub struct InMemoryProviderBackend {
    providers: RwLock<Vec<AccessPointProvider>>,
    secrets: RwLock<HashMap<ProviderId, ProviderCredentials>>,
    secrets_offline: AtomicBool,
}

impl InMemoryProviderBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: AccessPointProvider) {
        let mut providers = self.providers.write().unwrap_or_else(|p| p.into_inner());
        providers.push(provider);
    }

    /// Make unmasked reads fail, as when the secret store is unreachable.
    pub fn set_secrets_offline(&self, offline: bool) {
        self.secrets_offline.store(offline, Ordering::SeqCst);
    }

    fn owned(&self, tenant_id: TenantId, provider_id: ProviderId) -> Result<(), ProviderBackendError> {
        let providers = self.providers.read().unwrap_or_else(|p| p.into_inner());
        providers
            .iter()
            .any(|p| p.id == provider_id && p.owned_by(tenant_id))
            .then_some(())
            .ok_or(ProviderBackendError::NotFound(provider_id))
    }
}

#[async_trait]
impl ProviderBackend for InMemoryProviderBackend {
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<AccessPointProvider>, ProviderBackendError> {
        let providers = self.providers.read().unwrap_or_else(|p| p.into_inner());
        Ok(providers
            .iter()
            .filter(|p| p.owned_by(tenant_id))
            .cloned()
            .collect())
    }

    async fn credentials(
        &self,
        tenant_id: TenantId,
        provider_id: ProviderId,
        view: CredentialView,
    ) -> Result<BTreeMap<String, String>, ProviderBackendError> {
        self.owned(tenant_id, provider_id)?;
        if view == CredentialView::Unmasked && self.secrets_offline.load(Ordering::SeqCst) {
            return Err(ProviderBackendError::Unavailable("secret store unreachable".to_string()));
        }
        let secrets = self.secrets.read().unwrap_or_else(|p| p.into_inner());
        let fields = secrets
            .get(&provider_id)
            .map(ProviderCredentials::to_fields)
            .unwrap_or_default();
        Ok(match view {
            CredentialView::Masked => fields.into_iter().map(|(k, v)| (k, mask(&v))).collect(),
            CredentialView::Unmasked => fields,
        })
    }

    async fn activate(
        &self,
        tenant_id: TenantId,
        provider_id: ProviderId,
        credentials: Option<&ProviderCredentials>,
    ) -> Result<AccessPointProvider, ProviderBackendError> {
        self.owned(tenant_id, provider_id)?;
        if let Some(creds) = credentials {
            let mut secrets = self.secrets.write().unwrap_or_else(|p| p.into_inner());
            secrets.insert(provider_id, creds.clone());
        }

        let mut providers = self.providers.write().unwrap_or_else(|p| p.into_inner());
        let mut activated = None;
        for p in providers.iter_mut().filter(|p| p.owned_by(tenant_id)) {
            p.is_active = p.id == provider_id;
            if p.is_active {
                p.has_credentials |= credentials.is_some();
                activated = Some(p.clone());
            }
        }
        activated.ok_or(ProviderBackendError::NotFound(provider_id))
    }

    async fn update_credentials(
        &self,
        tenant_id: TenantId,
        provider_id: ProviderId,
        credentials: &ProviderCredentials,
    ) -> Result<AccessPointProvider, ProviderBackendError> {
        self.owned(tenant_id, provider_id)?;
        self.secrets
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(provider_id, credentials.clone());

        let mut providers = self.providers.write().unwrap_or_else(|p| p.into_inner());
        let provider = providers
            .iter_mut()
            .find(|p| p.id == provider_id)
            .ok_or(ProviderBackendError::NotFound(provider_id))?;
        provider.has_credentials = true;
        Ok(provider.clone())
    }

    async fn deactivate(&self, tenant_id: TenantId, provider_id: ProviderId) -> Result<(), ProviderBackendError> {
        self.owned(tenant_id, provider_id)?;
        let mut providers = self.providers.write().unwrap_or_else(|p| p.into_inner());
        if let Some(p) = providers.iter_mut().find(|p| p.id == provider_id) {
            p.is_active = false;
        }
        Ok(())
    }
}
