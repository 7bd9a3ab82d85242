use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use taxlink_connections::{ConnectionProfile, ProfileStore, StoreError};
use taxlink_core::{ProfileId, TenantId};

/// Profile store keyed by id. Reads across tenants see nothing.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<ProfileId, ConnectionProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn create(&self, mut profile: ConnectionProfile) -> Result<ConnectionProfile, StoreError> {
        let id = ProfileId::new();
        profile.id = Some(id);
        let mut profiles = self.profiles.write().unwrap_or_else(|p| p.into_inner());
        profiles.insert(id, profile.clone());
        Ok(profile)
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        id: ProfileId,
    ) -> Result<Option<ConnectionProfile>, StoreError> {
        let profiles = self.profiles.read().unwrap_or_else(|p| p.into_inner());
        Ok(profiles
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<ConnectionProfile>, StoreError> {
        let profiles = self.profiles.read().unwrap_or_else(|p| p.into_inner());
        let mut out: Vec<ConnectionProfile> = profiles
            .values()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect();
        // Ids are time-ordered, so this lists oldest first.
        out.sort_by_key(|p| p.id);
        Ok(out)
    }

    async fn update(&self, profile: ConnectionProfile) -> Result<ConnectionProfile, StoreError> {
        let id = profile
            .id
            .ok_or_else(|| StoreError::Backend("cannot update a profile without an id".to_string()))?;
        let mut profiles = self.profiles.write().unwrap_or_else(|p| p.into_inner());
        let existing = profiles.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if existing.tenant_id != profile.tenant_id {
            return Err(StoreError::TenantIsolation);
        }
        *existing = profile.clone();
        Ok(profile)
    }

    async fn delete(&self, tenant_id: TenantId, id: ProfileId) -> Result<(), StoreError> {
        let mut profiles = self.profiles.write().unwrap_or_else(|p| p.into_inner());
        match profiles.get(&id) {
            Some(p) if p.tenant_id == tenant_id => {
                profiles.remove(&id);
                Ok(())
            }
            Some(_) => Err(StoreError::TenantIsolation),
            None => Err(StoreError::NotFound(id)),
        }
    }
}
