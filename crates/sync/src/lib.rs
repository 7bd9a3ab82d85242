//! ERP sync orchestration: dependency-ordered planning, sequential
//! submission and polling of out-of-band jobs.
//!
//! The backend executes jobs; this crate only decides what to submit, in
//! which order, and how to read the snapshots it reports back.

pub mod backend;
pub mod coordinator;
pub mod history;
pub mod job;
pub mod monitor;
pub mod planner;

pub use backend::{BackendError, SyncBackend};
pub use coordinator::{SubmitError, SyncCoordinator, SyncError, SyncSubmission};
pub use history::{SyncHistory, SyncRecord};
pub use job::{SyncJob, SyncJobSpec, SyncMode, SyncStatus};
pub use monitor::{
    JobMonitor, JobObserver, JobUpdate, JobWatch, MonitorError, MonitorSettings, Observation,
    display_percentage,
};
pub use planner::{Advisory, PlanError, SYNC_ORDER, SyncPlan, SyncRequest, SyncScope, plan};
