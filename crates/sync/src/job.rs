//! Sync job types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use taxlink_connections::EntityType;
use taxlink_core::{Entity, ProfileId, SyncJobId, TenantId};

/// Job execution status as reported by the sync backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Accepted, waiting for a worker
    Queued,
    /// A worker is pulling records
    Processing,
    /// Finished successfully
    Completed,
    /// Finished with an error; never retried automatically
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Queued => "queued",
            SyncStatus::Processing => "processing",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Pull everything, ignoring the watermark.
    Full,
    /// Pull only records changed since the watermark.
    Incremental,
}

/// What to submit for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJobSpec {
    pub profile_id: ProfileId,
    pub entity_type: EntityType,
    pub mode: SyncMode,
    /// Set only for incremental jobs.
    pub watermark: Option<DateTime<Utc>>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Snapshot of an out-of-band sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: SyncJobId,
    pub tenant_id: TenantId,
    pub profile_id: ProfileId,
    pub entity_type: EntityType,
    pub mode: SyncMode,
    pub status: SyncStatus,
    pub current_step: Option<String>,
    /// 1-based position of `current_step` among `total_steps`.
    pub step_number: Option<u32>,
    pub total_steps: u32,
    pub progress_percentage: Option<u8>,
    /// Opaque backend message, surfaced verbatim.
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    /// A freshly accepted job for `spec`.
    pub fn queued(tenant_id: TenantId, spec: &SyncJobSpec, total_steps: u32) -> Self {
        Self {
            id: SyncJobId::new(),
            tenant_id,
            profile_id: spec.profile_id,
            entity_type: spec.entity_type,
            mode: spec.mode,
            status: SyncStatus::Queued,
            current_step: None,
            step_number: None,
            total_steps,
            progress_percentage: None,
            error_message: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl Entity for SyncJob {
    type Id = SyncJobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
