//! Dependency-ordered sync planning.
//!
//! Pure: reads the profile and the sync history, never calls out. The plan's
//! job order is the submission order.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use taxlink_connections::{ConnectionProfile, EntityType};
use taxlink_core::ProfileId;

use crate::history::SyncHistory;
use crate::job::{SyncJobSpec, SyncMode};

/// Submission order for a full run. Invoices reference the first three;
/// tax categories have no dependents.
pub const SYNC_ORDER: [EntityType; 5] = [
    EntityType::Vendors,
    EntityType::Customers,
    EntityType::Products,
    EntityType::Invoices,
    EntityType::TaxCategories,
];

const INVOICE_DEPENDENCIES: [EntityType; 3] = [
    EntityType::Vendors,
    EntityType::Customers,
    EntityType::Products,
];

/// Entities that accept a `date_from`/`date_to` window.
pub fn accepts_date_window(entity: EntityType) -> bool {
    matches!(
        entity,
        EntityType::Vendors | EntityType::Customers | EntityType::Invoices
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "entity")]
pub enum SyncScope {
    Entity(EntityType),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub scope: SyncScope,
    pub mode: SyncMode,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl SyncRequest {
    pub fn entity(entity: EntityType, mode: SyncMode) -> Self {
        Self {
            scope: SyncScope::Entity(entity),
            mode,
            date_from: None,
            date_to: None,
        }
    }

    pub fn all(mode: SyncMode) -> Self {
        Self {
            scope: SyncScope::All,
            mode,
            date_from: None,
            date_to: None,
        }
    }

    pub fn with_window(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    fn has_window(&self) -> bool {
        self.date_from.is_some() || self.date_to.is_some()
    }
}

/// Non-blocking notice returned with a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Advisory {
    /// Full invoice sync submitted before its dependencies ever synced.
    DependencyOrder { missing: Vec<EntityType> },
    /// Incremental requested but no watermark exists yet.
    DegradedToFull { entity: EntityType },
    /// Skipped because the ERP user cannot read it.
    NotReadable { entity: EntityType },
}

impl core::fmt::Display for Advisory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Advisory::DependencyOrder { missing } => {
                let names: Vec<&str> = missing.iter().map(EntityType::as_str).collect();
                write!(
                    f,
                    "invoices reference {} which have never synced; sync them first",
                    names.join(", ")
                )
            }
            Advisory::DegradedToFull { entity } => {
                write!(f, "{entity} has no previous successful sync; running a full sync")
            }
            Advisory::NotReadable { entity } => {
                write!(f, "{entity} skipped: read permission is disabled")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub jobs: Vec<SyncJobSpec>,
    pub advisories: Vec<Advisory>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("profile has not been saved yet")]
    Unsaved,
    #[error("profile {0} is inactive")]
    Inactive(ProfileId),
    #[error("{0} does not accept a date window")]
    WindowNotApplicable(EntityType),
    #[error("date_from {from} is after date_to {to}")]
    InvalidWindow { from: NaiveDate, to: NaiveDate },
    #[error("read permission for {0} is disabled")]
    NotReadable(EntityType),
}

/// Build the ordered job specs for `request`.
pub fn plan(
    profile: &ConnectionProfile,
    request: &SyncRequest,
    history: &SyncHistory,
) -> Result<SyncPlan, PlanError> {
    let profile_id = profile.id.ok_or(PlanError::Unsaved)?;
    if !profile.is_active {
        return Err(PlanError::Inactive(profile_id));
    }
    if let (Some(from), Some(to)) = (request.date_from, request.date_to) {
        if from > to {
            return Err(PlanError::InvalidWindow { from, to });
        }
    }

    let mut advisories = Vec::new();
    let entities: Vec<EntityType> = match request.scope {
        SyncScope::Entity(entity) => {
            if !profile.read_permissions.allows(entity) {
                return Err(PlanError::NotReadable(entity));
            }
            if request.has_window() && !accepts_date_window(entity) {
                return Err(PlanError::WindowNotApplicable(entity));
            }
            vec![entity]
        }
        SyncScope::All => SYNC_ORDER
            .into_iter()
            .filter(|entity| {
                let readable = profile.read_permissions.allows(*entity);
                if !readable {
                    advisories.push(Advisory::NotReadable { entity: *entity });
                }
                readable
            })
            .collect(),
    };

    let mut jobs = Vec::with_capacity(entities.len());
    for entity in entities {
        let (mode, watermark) = match request.mode {
            SyncMode::Full => (SyncMode::Full, None),
            SyncMode::Incremental => match history.watermark(profile_id, entity) {
                Some(mark) => (SyncMode::Incremental, Some(mark)),
                None => {
                    advisories.push(Advisory::DegradedToFull { entity });
                    (SyncMode::Full, None)
                }
            },
        };

        let (date_from, date_to) = if accepts_date_window(entity) {
            (request.date_from, request.date_to)
        } else {
            (None, None)
        };
        let date_from = if entity == EntityType::Invoices {
            // Never reach back past the profile's invoice cut-over date.
            let start = profile.invoice_sync_start_date;
            let from = date_from.map_or(start, |d| d.max(start));
            if let Some(to) = date_to {
                if from > to {
                    return Err(PlanError::InvalidWindow { from, to });
                }
            }
            Some(from)
        } else {
            date_from
        };

        if entity == EntityType::Invoices
            && mode == SyncMode::Full
            && request.scope == SyncScope::Entity(EntityType::Invoices)
        {
            let missing: Vec<EntityType> = INVOICE_DEPENDENCIES
                .into_iter()
                .filter(|dep| !history.has_succeeded(profile_id, *dep))
                .collect();
            if !missing.is_empty() {
                advisories.push(Advisory::DependencyOrder { missing });
            }
        }

        jobs.push(SyncJobSpec {
            profile_id,
            entity_type: entity,
            mode,
            watermark,
            date_from,
            date_to,
        });
    }

    tracing::debug!(
        profile = %profile_id,
        jobs = jobs.len(),
        advisories = advisories.len(),
        "sync planned"
    );
    Ok(SyncPlan { jobs, advisories })
}
