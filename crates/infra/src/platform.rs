//! Service wiring.
//!
//! `Platform` owns one instance of every service over a set of
//! collaborators. The sync coordinator doubles as the connection service's
//! job-activity source, so profile deletes see pending jobs.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use taxlink_auth::AuthContext;
use taxlink_compliance::{ComplianceGateway, ComplianceWorkflow};
use taxlink_connections::{
    ConnectionError, ConnectionNegotiator, ConnectionProber, ConnectionService, EntityType,
    ProfileStore,
};
use taxlink_core::{ProfileId, SyncJobId};
use taxlink_sync::{
    JobMonitor, JobUpdate, MonitorError, SyncBackend, SyncCoordinator, SyncError, SyncHistory,
    SyncRequest, SyncStatus, SyncSubmission,
};
use taxlink_vault::{CredentialVault, ProviderBackend};

use crate::config::BridgeConfig;

/// External systems the services talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub profiles: Arc<dyn ProfileStore>,
    pub prober: Arc<dyn ConnectionProber>,
    pub sync_backend: Arc<dyn SyncBackend>,
    pub gateway: Arc<dyn ComplianceGateway>,
    pub providers: Arc<dyn ProviderBackend>,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

/// How one submitted job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub job_id: SyncJobId,
    pub entity_type: EntityType,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    /// Progress updates observed before the terminal one.
    pub progress_updates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRun {
    pub submission: SyncSubmission,
    pub outcomes: Vec<JobOutcome>,
}

pub struct Platform {
    pub connections: ConnectionService,
    pub sync: Arc<SyncCoordinator>,
    pub monitor: JobMonitor,
    pub compliance: ComplianceWorkflow,
    pub vault: CredentialVault,
}

impl Platform {
    pub fn new(collaborators: Collaborators, config: &BridgeConfig) -> Self {
        let history = Arc::new(SyncHistory::new());
        let sync = Arc::new(SyncCoordinator::new(
            collaborators.sync_backend.clone(),
            history.clone(),
        ));
        let monitor = JobMonitor::new(
            collaborators.sync_backend,
            history,
            config.monitor_settings(),
        );
        let connections = ConnectionService::new(
            collaborators.profiles,
            sync.clone(),
            ConnectionNegotiator::new(collaborators.prober),
        );

        Self {
            connections,
            sync,
            monitor,
            compliance: ComplianceWorkflow::new(collaborators.gateway),
            vault: CredentialVault::new(collaborators.providers),
        }
    }

    /// Trigger a sync for a saved profile and watch every submitted job to a
    /// terminal state.
    pub async fn sync_and_wait(
        &self,
        ctx: &AuthContext,
        profile_id: ProfileId,
        request: SyncRequest,
    ) -> Result<SyncRun, PlatformError> {
        let profile = self.connections.get(ctx, profile_id).await?;
        let submission = self.sync.trigger(ctx, &profile, request).await?;

        let mut watches = Vec::with_capacity(submission.jobs.len());
        for job in &submission.jobs {
            watches.push((job.entity_type, self.monitor.watch(ctx.tenant_id, job.id)?));
        }

        let mut outcomes = Vec::with_capacity(watches.len());
        for (entity_type, mut watch) in watches {
            let job_id = watch.job_id();
            let mut progress_updates = 0;
            let mut error_message = None;
            while let Some(update) = watch.next().await {
                match update {
                    JobUpdate::Progress { .. } => progress_updates += 1,
                    JobUpdate::Failed { message, .. } => error_message = Some(message),
                    JobUpdate::Completed { .. } | JobUpdate::PollError { .. } => {}
                }
            }
            let status = watch.finish().await?;
            tracing::info!(job = %job_id, entity = %entity_type, %status, "sync job finished");
            outcomes.push(JobOutcome {
                job_id,
                entity_type,
                status,
                error_message,
                progress_updates,
            });
        }

        Ok(SyncRun {
            submission,
            outcomes,
        })
    }
}
