//! Submits planned jobs to the sync backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use taxlink_auth::{AuthContext, AuthzError, Permission, authorize_for_tenant};
use taxlink_connections::{ConnectionProfile, EntityType, JobActivity, StoreError};
use taxlink_core::{DomainError, InFlight, ProfileId, SyncJobId, TenantId};

use crate::backend::{BackendError, SyncBackend};
use crate::history::SyncHistory;
use crate::job::SyncJob;
use crate::planner::{Advisory, PlanError, SyncRequest, plan};

/// A submission that failed partway through a plan.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("submitting {entity} failed after {} job(s) were accepted: {source}", .submitted.len())]
pub struct SubmitError {
    pub entity: EntityType,
    /// Jobs accepted before the failure, in submission order.
    pub submitted: Vec<SyncJobId>,
    pub source: BackendError,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Unauthorized(#[from] AuthzError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Jobs accepted by the backend plus the planner's advisories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSubmission {
    pub jobs: Vec<SyncJob>,
    pub advisories: Vec<Advisory>,
}

pub struct SyncCoordinator {
    backend: Arc<dyn SyncBackend>,
    history: Arc<SyncHistory>,
    inflight: InFlight<ProfileId>,
}

impl SyncCoordinator {
    pub fn new(backend: Arc<dyn SyncBackend>, history: Arc<SyncHistory>) -> Self {
        Self {
            backend,
            history,
            inflight: InFlight::new(),
        }
    }

    pub fn history(&self) -> &Arc<SyncHistory> {
        &self.history
    }

    /// Plan and submit a sync. Each job is awaited before the next is sent.
    pub async fn trigger(
        &self,
        ctx: &AuthContext,
        profile: &ConnectionProfile,
        request: SyncRequest,
    ) -> Result<SyncSubmission, SyncError> {
        authorize_for_tenant(ctx, profile.tenant_id, Permission::TriggerSync)?;
        let profile_id = profile.id.ok_or(PlanError::Unsaved)?;
        let _claim = self.inflight.claim(profile_id)?;

        let plan = plan(profile, &request, &self.history)?;
        for advisory in &plan.advisories {
            tracing::warn!(profile = %profile_id, %advisory, "sync advisory");
        }

        let mut jobs = Vec::with_capacity(plan.jobs.len());
        for spec in &plan.jobs {
            match self.backend.submit_job(profile.tenant_id, spec).await {
                Ok(job) => {
                    tracing::info!(
                        profile = %profile_id,
                        job = %job.id,
                        entity = %spec.entity_type,
                        mode = ?spec.mode,
                        "sync job submitted"
                    );
                    jobs.push(job);
                }
                Err(source) => {
                    tracing::warn!(
                        profile = %profile_id,
                        entity = %spec.entity_type,
                        error = %source,
                        submitted = jobs.len(),
                        "sync submission stopped"
                    );
                    return Err(SubmitError {
                        entity: spec.entity_type,
                        submitted: jobs.iter().map(|j| j.id).collect(),
                        source,
                    }
                    .into());
                }
            }
        }

        Ok(SyncSubmission {
            jobs,
            advisories: plan.advisories,
        })
    }

    pub async fn job(&self, ctx: &AuthContext, job_id: SyncJobId) -> Result<Option<SyncJob>, SyncError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ViewSyncJobs)?;
        Ok(self.backend.job_snapshot(ctx.tenant_id, job_id).await?)
    }

    pub async fn pending_jobs(&self, ctx: &AuthContext, profile_id: ProfileId) -> Result<usize, SyncError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ViewSyncJobs)?;
        Ok(self.backend.pending_jobs_count(ctx.tenant_id, profile_id).await?)
    }
}

#[async_trait]
impl JobActivity for SyncCoordinator {
    async fn pending_jobs_count(
        &self,
        tenant_id: TenantId,
        profile_id: ProfileId,
    ) -> Result<usize, StoreError> {
        self.backend
            .pending_jobs_count(tenant_id, profile_id)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
