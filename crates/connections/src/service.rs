//! Profile lifecycle: validate → test → persist, plus edits, soft-disable and
//! guarded deletion.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use taxlink_auth::{AuthContext, Permission, authorize_for_tenant};
use taxlink_core::{InFlight, ProfileId, TenantId};

use crate::error::{ConnectionError, StoreError};
use crate::negotiator::{ConnectionNegotiator, ConnectionTestResult, TestSubject};
use crate::profile::{ConnectionPath, ConnectionProfile};
use crate::validator::{FieldAdjustment, validate};

/// Persistence collaborator for connection profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Persist a new profile and assign its id.
    async fn create(&self, profile: ConnectionProfile) -> Result<ConnectionProfile, StoreError>;

    async fn get(
        &self,
        tenant_id: TenantId,
        id: ProfileId,
    ) -> Result<Option<ConnectionProfile>, StoreError>;

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<ConnectionProfile>, StoreError>;

    async fn update(&self, profile: ConnectionProfile) -> Result<ConnectionProfile, StoreError>;

    async fn delete(&self, tenant_id: TenantId, id: ProfileId) -> Result<(), StoreError>;
}

/// Read-only view of sync activity, used to guard deletion.
#[async_trait]
pub trait JobActivity: Send + Sync {
    async fn pending_jobs_count(
        &self,
        tenant_id: TenantId,
        profile_id: ProfileId,
    ) -> Result<usize, StoreError>;
}

/// A persisted profile plus any adjustments validation applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedProfile {
    pub profile: ConnectionProfile,
    pub adjustments: Vec<FieldAdjustment>,
}

pub struct ConnectionService {
    store: Arc<dyn ProfileStore>,
    activity: Arc<dyn JobActivity>,
    negotiator: ConnectionNegotiator,
    inflight: InFlight<ProfileId>,
    creating: InFlight<TenantId>,
}

impl ConnectionService {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        activity: Arc<dyn JobActivity>,
        negotiator: ConnectionNegotiator,
    ) -> Self {
        Self {
            store,
            activity,
            negotiator,
            inflight: InFlight::new(),
            creating: InFlight::new(),
        }
    }

    /// Validate, test and persist a new profile. The profile is stored active
    /// only when its connection test succeeds; on failure nothing is stored.
    pub async fn create(
        &self,
        ctx: &AuthContext,
        draft: ConnectionProfile,
    ) -> Result<SavedProfile, ConnectionError> {
        authorize_for_tenant(ctx, draft.tenant_id, Permission::ManageConnections)?;
        let _claim = self.creating.claim(draft.tenant_id)?;

        let validated = validate(draft.erp_type, &draft, today())?;
        let mut profile = validated.profile;
        profile.id = None;

        let result = self
            .negotiator
            .test(TestSubject::Draft(profile.tenant_id), &profile, None)
            .await;
        if !result.success {
            tracing::warn!(
                tenant = %profile.tenant_id,
                erp_type = %profile.erp_type,
                message = %result.message,
                "profile not saved: connection test failed"
            );
            return Err(ConnectionError::TestFailed(result));
        }

        profile.is_active = true;
        profile.last_test = Some(result);
        let saved = self.store.create(profile).await?;
        tracing::info!(profile = ?saved.id, erp_type = %saved.erp_type, "connection profile created");

        Ok(SavedProfile {
            profile: saved,
            adjustments: validated.adjustments,
        })
    }

    /// Test an unsaved profile payload.
    pub async fn test_draft(
        &self,
        ctx: &AuthContext,
        draft: &ConnectionProfile,
        path: Option<ConnectionPath>,
    ) -> Result<ConnectionTestResult, ConnectionError> {
        authorize_for_tenant(ctx, draft.tenant_id, Permission::TestConnections)?;
        let validated = validate(draft.erp_type, draft, today())?;

        Ok(self
            .negotiator
            .test(TestSubject::Draft(draft.tenant_id), &validated.profile, path)
            .await)
    }

    /// Test a persisted profile and cache the result on it.
    pub async fn test_saved(
        &self,
        ctx: &AuthContext,
        id: ProfileId,
        path: Option<ConnectionPath>,
    ) -> Result<ConnectionTestResult, ConnectionError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::TestConnections)?;
        let tested = self.load(ctx.tenant_id, id).await?;

        let result = self
            .negotiator
            .test(TestSubject::Saved(id), &tested, path)
            .await;

        self.cache_result(id, &tested, &result).await;
        Ok(result)
    }

    /// Store `result` as the profile's `last_test`. Skipped when an edit is in
    /// flight or the connection settings changed while the test ran.
    async fn cache_result(
        &self,
        id: ProfileId,
        tested: &ConnectionProfile,
        result: &ConnectionTestResult,
    ) {
        let Ok(_claim) = self.inflight.claim(id) else {
            tracing::info!(profile = %id, "profile is being edited; test result not cached");
            return;
        };
        let mut current = match self.load(tested.tenant_id, id).await {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(profile = %id, error = %e, "could not cache connection test result");
                return;
            }
        };
        if fingerprint_changed(tested, &current) {
            tracing::info!(profile = %id, "connection settings changed during the test; result not cached");
            return;
        }

        current.last_test = Some(result.clone());
        if let Err(e) = self.store.update(current).await {
            tracing::warn!(profile = %id, error = %e, "could not cache connection test result");
        }
    }

    /// Re-validate and persist an edited profile.
    ///
    /// `is_active` and `last_test` are not taken from the caller. Changing the
    /// connection settings drops the cached test and deactivates the profile
    /// until it is tested again.
    pub async fn update(
        &self,
        ctx: &AuthContext,
        profile: ConnectionProfile,
    ) -> Result<SavedProfile, ConnectionError> {
        authorize_for_tenant(ctx, profile.tenant_id, Permission::ManageConnections)?;
        let id = profile.id.ok_or(ConnectionError::Unsaved)?;
        let _claim = self.inflight.claim(id)?;

        let current = self.load(profile.tenant_id, id).await?;
        let validated = validate(profile.erp_type, &profile, today())?;

        let mut next = validated.profile;
        let changed = fingerprint_changed(&current, &next);
        next.last_test = if changed { None } else { current.last_test.clone() };
        next.is_active = current.is_active && !changed;
        if changed && current.is_active {
            tracing::info!(profile = %id, "connection settings changed; profile inactive until retested");
        }
        let saved = self.store.update(next).await?;
        tracing::info!(profile = %id, "connection profile updated");

        Ok(SavedProfile {
            profile: saved,
            adjustments: validated.adjustments,
        })
    }

    /// Soft-enable or soft-disable a profile. Enabling needs a passing
    /// cached test.
    pub async fn set_active(
        &self,
        ctx: &AuthContext,
        id: ProfileId,
        active: bool,
    ) -> Result<ConnectionProfile, ConnectionError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ManageConnections)?;
        let _claim = self.inflight.claim(id)?;

        let mut profile = self.load(ctx.tenant_id, id).await?;
        if profile.is_active == active {
            return Ok(profile);
        }
        if active && !profile.last_test.as_ref().is_some_and(|t| t.success) {
            tracing::warn!(profile = %id, "activation refused: no passing connection test");
            return Err(ConnectionError::NotTested(id));
        }
        profile.is_active = active;
        let saved = self.store.update(profile).await?;
        tracing::info!(profile = %id, active, "connection profile toggled");
        Ok(saved)
    }

    /// Hard-delete a profile. Refused while any of its sync jobs is pending.
    pub async fn delete(&self, ctx: &AuthContext, id: ProfileId) -> Result<(), ConnectionError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ManageConnections)?;
        let _claim = self.inflight.claim(id)?;

        let count = self.activity.pending_jobs_count(ctx.tenant_id, id).await?;
        if count > 0 {
            return Err(ConnectionError::PendingJobs {
                profile_id: id,
                count,
            });
        }

        self.store.delete(ctx.tenant_id, id).await?;
        tracing::info!(profile = %id, "connection profile deleted");
        Ok(())
    }

    pub async fn get(
        &self,
        ctx: &AuthContext,
        id: ProfileId,
    ) -> Result<ConnectionProfile, ConnectionError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ViewConnections)?;
        self.load(ctx.tenant_id, id).await
    }

    pub async fn list(&self, ctx: &AuthContext) -> Result<Vec<ConnectionProfile>, ConnectionError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ViewConnections)?;
        Ok(self.store.list(ctx.tenant_id).await?)
    }

    async fn load(
        &self,
        tenant_id: TenantId,
        id: ProfileId,
    ) -> Result<ConnectionProfile, ConnectionError> {
        self.store
            .get(tenant_id, id)
            .await?
            .ok_or(ConnectionError::Store(StoreError::NotFound(id)))
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn fingerprint_changed(before: &ConnectionProfile, after: &ConnectionProfile) -> bool {
    before.erp_type != after.erp_type
        || before.server_details != after.server_details
        || before.api_credentials != after.api_credentials
        || before.db_credentials != after.db_credentials
}
