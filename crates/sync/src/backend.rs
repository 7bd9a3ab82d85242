use async_trait::async_trait;
use thiserror::Error;

use taxlink_core::{ProfileId, SyncJobId, TenantId};

use crate::job::{SyncJob, SyncJobSpec};

/// Sync backend failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("submission rejected: {0}")]
    Rejected(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Out-of-band job execution service.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Enqueue one job and return its initial snapshot.
    async fn submit_job(&self, tenant_id: TenantId, spec: &SyncJobSpec)
    -> Result<SyncJob, BackendError>;

    /// Latest snapshot of a job, `None` if it does not exist.
    async fn job_snapshot(
        &self,
        tenant_id: TenantId,
        job_id: SyncJobId,
    ) -> Result<Option<SyncJob>, BackendError>;

    /// Non-terminal jobs for a profile.
    async fn pending_jobs_count(
        &self,
        tenant_id: TenantId,
        profile_id: ProfileId,
    ) -> Result<usize, BackendError>;
}
