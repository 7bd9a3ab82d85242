//! Per-profile record of successful syncs.
//!
//! A watermark only moves when a job completes. It is set to the job's
//! `started_at`, so records changed while the job ran are pulled again on
//! the next incremental run. Failed jobs never touch it.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use taxlink_connections::EntityType;
use taxlink_core::{ProfileId, SyncJobId};

use crate::job::{SyncJob, SyncStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncRecord {
    pub job_id: SyncJobId,
    pub watermark: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SyncHistory {
    records: RwLock<HashMap<(ProfileId, EntityType), SyncRecord>>,
}

impl SyncHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a job snapshot. Returns `true` when the watermark advanced.
    pub fn record(&self, job: &SyncJob) -> bool {
        if job.status != SyncStatus::Completed {
            return false;
        }
        let Some(watermark) = job.started_at.or(job.completed_at) else {
            tracing::warn!(job = %job.id, "completed job has no timestamps; watermark unchanged");
            return false;
        };

        let mut records = self.write();
        let key = (job.profile_id, job.entity_type);
        match records.get(&key) {
            Some(existing) if existing.watermark >= watermark => false,
            _ => {
                records.insert(
                    key,
                    SyncRecord {
                        job_id: job.id,
                        watermark,
                    },
                );
                tracing::debug!(
                    profile = %job.profile_id,
                    entity = %job.entity_type,
                    %watermark,
                    "sync watermark advanced"
                );
                true
            }
        }
    }

    pub fn watermark(&self, profile_id: ProfileId, entity: EntityType) -> Option<DateTime<Utc>> {
        self.read().get(&(profile_id, entity)).map(|r| r.watermark)
    }

    pub fn has_succeeded(&self, profile_id: ProfileId, entity: EntityType) -> bool {
        self.read().contains_key(&(profile_id, entity))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<(ProfileId, EntityType), SyncRecord>> {
        self.records.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<(ProfileId, EntityType), SyncRecord>> {
        self.records.write().unwrap_or_else(|p| p.into_inner())
    }
}
