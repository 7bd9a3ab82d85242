use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use taxlink_connections::EntityType;
use taxlink_core::{Entity, ProfileId, SyncJobId, TenantId};
use taxlink_sync::{BackendError, SyncBackend, SyncJob, SyncJobSpec, SyncStatus};

/// Steps every simulated job walks through.
pub const SIMULATED_STEPS: [&str; 3] = ["Extracting records", "Mapping records", "Loading records"];

/// Sync worker stand-in. Every snapshot read advances the job by one step,
/// so a monitor polling it sees a realistic progression.
#[derive(Debug, Default)]
pub struct SimulatedSyncBackend {
    jobs: RwLock<Vec<SyncJob>>,
    failures: RwLock<HashMap<EntityType, String>>,
    refusals: RwLock<HashMap<EntityType, String>>,
}

impl SimulatedSyncBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs for `entity` fail on their last step with `message`.
    pub fn fail_entity(&self, entity: EntityType, message: impl Into<String>) {
        let mut failures = self.failures.write().unwrap_or_else(|p| p.into_inner());
        failures.insert(entity, message.into());
    }

    /// Submissions for `entity` are refused outright.
    pub fn refuse_entity(&self, entity: EntityType, reason: impl Into<String>) {
        let mut refusals = self.refusals.write().unwrap_or_else(|p| p.into_inner());
        refusals.insert(entity, reason.into());
    }

    /// Every accepted job, in submission order.
    pub fn submitted(&self) -> Vec<SyncJob> {
        self.jobs.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn advance(&self, job: &mut SyncJob) {
        let total = job.total_steps;
        match job.status {
            SyncStatus::Queued => {
                job.status = SyncStatus::Processing;
                job.started_at = Some(Utc::now());
                set_step(job, 1);
            }
            SyncStatus::Processing => {
                let step = job.step_number.unwrap_or(1);
                if step < total {
                    set_step(job, step + 1);
                    return;
                }
                let failure = self
                    .failures
                    .read()
                    .unwrap_or_else(|p| p.into_inner())
                    .get(&job.entity_type)
                    .cloned();
                job.completed_at = Some(Utc::now());
                match failure {
                    Some(message) => {
                        job.status = SyncStatus::Failed;
                        job.error_message = Some(message);
                    }
                    None => {
                        job.status = SyncStatus::Completed;
                        job.current_step = None;
                        job.step_number = None;
                        job.progress_percentage = Some(100);
                    }
                }
            }
            SyncStatus::Completed | SyncStatus::Failed => {}
        }
    }
}

fn set_step(job: &mut SyncJob, step: u32) {
    let idx = (step as usize).saturating_sub(1);
    job.step_number = Some(step);
    job.current_step = SIMULATED_STEPS.get(idx).map(|s| s.to_string());
}

#[async_trait]
impl SyncBackend for SimulatedSyncBackend {
    async fn submit_job(&self, tenant_id: TenantId, spec: &SyncJobSpec) -> Result<SyncJob, BackendError> {
        if let Some(reason) = self
            .refusals
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&spec.entity_type)
        {
            return Err(BackendError::Rejected(reason.clone()));
        }

        let job = SyncJob::queued(tenant_id, spec, SIMULATED_STEPS.len() as u32);
        let mut jobs = self.jobs.write().unwrap_or_else(|p| p.into_inner());
        jobs.push(job.clone());
        Ok(job)
    }

    async fn job_snapshot(
        &self,
        tenant_id: TenantId,
        job_id: SyncJobId,
    ) -> Result<Option<SyncJob>, BackendError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|p| p.into_inner());
        let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) else {
            return Ok(None);
        };
        if !job.owned_by(tenant_id) {
            return Err(BackendError::TenantIsolation);
        }
        self.advance(job);
        Ok(Some(job.clone()))
    }

    async fn pending_jobs_count(
        &self,
        tenant_id: TenantId,
        profile_id: ProfileId,
    ) -> Result<usize, BackendError> {
        let jobs = self.jobs.read().unwrap_or_else(|p| p.into_inner());
        Ok(jobs
            .iter()
            .filter(|j| j.owned_by(tenant_id) && j.profile_id == profile_id)
            .filter(|j| !j.status.is_terminal())
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxlink_sync::{SyncMode, display_percentage};

    fn spec(entity: EntityType) -> SyncJobSpec {
        SyncJobSpec {
            profile_id: ProfileId::new(),
            entity_type: entity,
            mode: SyncMode::Full,
            watermark: None,
            date_from: None,
            date_to: None,
        }
    }

    #[tokio::test]
    async fn snapshots_walk_the_job_to_completion() {
        let backend = SimulatedSyncBackend::new();
        let tenant = TenantId::new();
        let job = backend.submit_job(tenant, &spec(EntityType::Vendors)).await.unwrap();
        assert_eq!(backend.pending_jobs_count(tenant, job.profile_id).await.unwrap(), 1);

        let mut seen = Vec::new();
        loop {
            let snap = backend.job_snapshot(tenant, job.id).await.unwrap().unwrap();
            seen.push(display_percentage(&snap));
            if snap.is_terminal() {
                assert_eq!(snap.status, SyncStatus::Completed);
                break;
            }
        }
        assert_eq!(seen, vec![0, 33, 66, 100]);
        assert_eq!(backend.pending_jobs_count(tenant, job.profile_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn scripted_failures_surface_the_message() {
        let backend = SimulatedSyncBackend::new();
        backend.fail_entity(EntityType::Invoices, "ERP session expired");
        let tenant = TenantId::new();
        let job = backend.submit_job(tenant, &spec(EntityType::Invoices)).await.unwrap();

        let mut last = None;
        for _ in 0..=SIMULATED_STEPS.len() {
            last = backend.job_snapshot(tenant, job.id).await.unwrap();
        }
        let last = last.unwrap();
        assert_eq!(last.status, SyncStatus::Failed);
        assert_eq!(last.error_message.as_deref(), Some("ERP session expired"));

        let other = TenantId::new();
        assert_eq!(
            backend.job_snapshot(other, job.id).await,
            Err(BackendError::TenantIsolation)
        );
    }
}
