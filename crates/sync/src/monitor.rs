//! Polling observer for out-of-band sync jobs.
//!
//! [`JobObserver`] is the per-watch state machine (`idle → polling →
//! terminal`). [`JobMonitor`] drives it from a spawned polling task and keeps
//! the ledger of job ids whose completion has already been announced, so a
//! re-opened watch does not announce it again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use taxlink_core::{InFlight, SyncJobId, TenantId};

use crate::backend::{BackendError, SyncBackend};
use crate::history::SyncHistory;
use crate::job::{SyncJob, SyncStatus};

/// Highest percentage shown before the backend confirms completion.
pub const MAX_UNCONFIRMED_PERCENT: u8 = 99;

/// Percentage to display for a snapshot.
///
/// Uses the backend's figure when present, otherwise the step position.
/// Clamped below 100 while a step is still reported and the job has not
/// completed.
pub fn display_percentage(job: &SyncJob) -> u8 {
    if job.status == SyncStatus::Completed && job.current_step.is_none() {
        return 100;
    }
    let raw = match job.progress_percentage {
        Some(p) => p.min(100),
        None => derived_percentage(job),
    };
    if job.current_step.is_some() && job.status != SyncStatus::Completed {
        raw.min(MAX_UNCONFIRMED_PERCENT)
    } else {
        raw
    }
}

fn derived_percentage(job: &SyncJob) -> u8 {
    match (job.step_number, job.total_steps) {
        (Some(step), total) if total > 0 => {
            let done = u64::from(step.saturating_sub(1).min(total));
            (done * 100 / u64::from(total)) as u8
        }
        _ if job.status == SyncStatus::Completed => 100,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObserverState {
    Idle,
    Polling(SyncStatus),
    Terminal,
}

/// What a single snapshot meant to the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Progress {
        status: SyncStatus,
        percentage: u8,
        current_step: Option<String>,
    },
    /// Older than what was already seen; discard.
    Stale,
    /// First transition into `completed` seen by this observer.
    JustCompleted,
    /// First transition into `failed` seen by this observer.
    JustFailed { message: String },
    /// The job was terminal on the first snapshot.
    AlreadyTerminal {
        status: SyncStatus,
        error_message: Option<String>,
    },
    /// Arrived after terminal, or for another job.
    Ignored,
}

#[derive(Debug)]
pub struct JobObserver {
    job_id: SyncJobId,
    state: ObserverState,
}

impl JobObserver {
    pub fn new(job_id: SyncJobId) -> Self {
        Self {
            job_id,
            state: ObserverState::Idle,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state == ObserverState::Terminal
    }

    pub fn ingest(&mut self, job: &SyncJob) -> Observation {
        if job.id != self.job_id {
            return Observation::Ignored;
        }

        match self.state {
            ObserverState::Terminal => Observation::Ignored,
            ObserverState::Idle if job.is_terminal() => {
                self.state = ObserverState::Terminal;
                Observation::AlreadyTerminal {
                    status: job.status,
                    error_message: job.error_message.clone(),
                }
            }
            ObserverState::Polling(SyncStatus::Processing) if job.status == SyncStatus::Queued => {
                Observation::Stale
            }
            ObserverState::Idle | ObserverState::Polling(_) => {
                if job.is_terminal() {
                    self.state = ObserverState::Terminal;
                    return match job.status {
                        SyncStatus::Failed => Observation::JustFailed {
                            message: job.error_message.clone().unwrap_or_default(),
                        },
                        _ => Observation::JustCompleted,
                    };
                }
                self.state = ObserverState::Polling(job.status);
                Observation::Progress {
                    status: job.status,
                    percentage: display_percentage(job),
                    current_step: job.current_step.clone(),
                }
            }
        }
    }
}

/// Item delivered to a [`JobWatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobUpdate {
    Progress {
        job_id: SyncJobId,
        status: SyncStatus,
        percentage: u8,
        current_step: Option<String>,
    },
    /// `notify` is true exactly once per job id per monitor.
    Completed { job_id: SyncJobId, notify: bool },
    /// `message` is the backend's text, unmodified.
    Failed {
        job_id: SyncJobId,
        message: String,
        notify: bool,
    },
    /// A poll failed; the watch keeps going until the failure budget is spent.
    PollError {
        job_id: SyncJobId,
        attempt: u32,
        message: String,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("job {0} is already being watched")]
    AlreadyWatched(SyncJobId),
    #[error("job {0} not found")]
    NotFound(SyncJobId),
    #[error("gave up on job {job_id} after {attempts} failed polls: {last}")]
    PollFailed {
        job_id: SyncJobId,
        attempts: u32,
        last: BackendError,
    },
    #[error("watch cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub max_consecutive_poll_failures: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_consecutive_poll_failures: 5,
        }
    }
}

/// Live observation of one job. Dropping it stops polling; the job itself
/// keeps running on the backend.
#[derive(Debug)]
pub struct JobWatch {
    job_id: SyncJobId,
    updates: mpsc::UnboundedReceiver<JobUpdate>,
    task: JoinHandle<Result<SyncStatus, MonitorError>>,
}

impl JobWatch {
    pub fn job_id(&self) -> SyncJobId {
        self.job_id
    }

    /// Next update, or `None` once polling has stopped and all updates are drained.
    pub async fn next(&mut self) -> Option<JobUpdate> {
        self.updates.recv().await
    }

    /// Stop polling.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Wait for the polling task to end and return the terminal status.
    pub async fn finish(mut self) -> Result<SyncStatus, MonitorError> {
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(_) => Err(MonitorError::Cancelled),
        }
    }
}

impl Drop for JobWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone)]
pub struct JobMonitor {
    backend: Arc<dyn SyncBackend>,
    history: Arc<SyncHistory>,
    settings: MonitorSettings,
    watching: InFlight<SyncJobId>,
    notified: Arc<Mutex<HashSet<SyncJobId>>>,
}

impl JobMonitor {
    pub fn new(
        backend: Arc<dyn SyncBackend>,
        history: Arc<SyncHistory>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            backend,
            history,
            settings,
            watching: InFlight::new(),
            notified: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a completion for `job_id` has already been announced.
    pub fn was_notified(&self, job_id: SyncJobId) -> bool {
        self.ledger().contains(&job_id)
    }

    /// Start polling `job_id`. At most one watch per job id is live.
    pub fn watch(&self, tenant_id: TenantId, job_id: SyncJobId) -> Result<JobWatch, MonitorError> {
        let claim = self
            .watching
            .claim(job_id)
            .map_err(|_| MonitorError::AlreadyWatched(job_id))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let monitor = self.clone();
        let task = tokio::spawn(async move {
            let _claim = claim;
            monitor.poll_until_terminal(tenant_id, job_id, tx).await
        });

        Ok(JobWatch {
            job_id,
            updates: rx,
            task,
        })
    }

    async fn poll_until_terminal(
        &self,
        tenant_id: TenantId,
        job_id: SyncJobId,
        tx: mpsc::UnboundedSender<JobUpdate>,
    ) -> Result<SyncStatus, MonitorError> {
        let mut observer = JobObserver::new(job_id);
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut failures = 0u32;

        loop {
            ticker.tick().await;

            let job = match self.backend.job_snapshot(tenant_id, job_id).await {
                Ok(Some(job)) => {
                    failures = 0;
                    job
                }
                Ok(None) => return Err(MonitorError::NotFound(job_id)),
                Err(e) => {
                    failures += 1;
                    tracing::warn!(job = %job_id, attempt = failures, error = %e, "sync job poll failed");
                    let _ = tx.send(JobUpdate::PollError {
                        job_id,
                        attempt: failures,
                        message: e.to_string(),
                    });
                    if failures >= self.settings.max_consecutive_poll_failures {
                        return Err(MonitorError::PollFailed {
                            job_id,
                            attempts: failures,
                            last: e,
                        });
                    }
                    continue;
                }
            };

            let observation = observer.ingest(&job);
            tracing::debug!(job = %job_id, status = %job.status, ?observation, "sync job polled");

            let update = match observation {
                Observation::Progress {
                    status,
                    percentage,
                    current_step,
                } => JobUpdate::Progress {
                    job_id,
                    status,
                    percentage,
                    current_step,
                },
                Observation::Stale | Observation::Ignored => continue,
                Observation::JustCompleted => JobUpdate::Completed {
                    job_id,
                    notify: self.mark_notified(job_id),
                },
                Observation::JustFailed { message } => JobUpdate::Failed {
                    job_id,
                    message,
                    notify: self.mark_notified(job_id),
                },
                Observation::AlreadyTerminal {
                    status: SyncStatus::Failed,
                    error_message,
                } => JobUpdate::Failed {
                    job_id,
                    message: error_message.unwrap_or_default(),
                    notify: false,
                },
                Observation::AlreadyTerminal { .. } => JobUpdate::Completed {
                    job_id,
                    notify: false,
                },
            };
            let _ = tx.send(update);

            if observer.is_terminal() {
                if job.status == SyncStatus::Completed {
                    self.history.record(&job);
                    tracing::info!(job = %job_id, entity = %job.entity_type, "sync job completed");
                } else {
                    tracing::warn!(
                        job = %job_id,
                        entity = %job.entity_type,
                        error = job.error_message.as_deref().unwrap_or(""),
                        "sync job failed"
                    );
                }
                return Ok(job.status);
            }
        }
    }

    fn mark_notified(&self, job_id: SyncJobId) -> bool {
        self.ledger().insert(job_id)
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, HashSet<SyncJobId>> {
        self.notified.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{SyncJobSpec, SyncMode};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use taxlink_connections::EntityType;
    use taxlink_core::ProfileId;

    fn job(status: SyncStatus) -> SyncJob {
        let spec = SyncJobSpec {
            profile_id: ProfileId::new(),
            entity_type: EntityType::Customers,
            mode: SyncMode::Full,
            watermark: None,
            date_from: None,
            date_to: None,
        };
        let mut job = SyncJob::queued(TenantId::new(), &spec, 4);
        job.status = status;
        job
    }

    fn with(base: &SyncJob, status: SyncStatus) -> SyncJob {
        SyncJob {
            status,
            ..base.clone()
        }
    }

    #[test]
    fn percentage_is_clamped_while_a_step_is_reported() {
        let mut snapshot = job(SyncStatus::Processing);
        snapshot.current_step = Some("customers".to_string());
        snapshot.progress_percentage = Some(60);
        assert_eq!(display_percentage(&snapshot), 60);

        snapshot.progress_percentage = Some(100);
        assert_eq!(display_percentage(&snapshot), 99);

        let mut done = with(&snapshot, SyncStatus::Completed);
        done.current_step = None;
        assert_eq!(display_percentage(&done), 100);
    }

    #[test]
    fn percentage_is_derived_from_step_position_when_missing() {
        let mut snapshot = job(SyncStatus::Processing);
        snapshot.current_step = Some("products".to_string());
        snapshot.step_number = Some(3);
        assert_eq!(display_percentage(&snapshot), 50);
    }

    #[test]
    fn derived_percentage_handles_huge_step_counts() {
        let mut snapshot = job(SyncStatus::Processing);
        snapshot.total_steps = u32::MAX;
        snapshot.step_number = Some(u32::MAX / 2 + 1);
        assert_eq!(display_percentage(&snapshot), 49);

        snapshot.step_number = Some(u32::MAX);
        assert_eq!(display_percentage(&snapshot), 99);
    }

    #[test]
    fn processing_then_completed_fires_once() {
        let base = job(SyncStatus::Processing);
        let mut observer = JobObserver::new(base.id);

        let mut processing = base.clone();
        processing.current_step = Some("customers".to_string());
        processing.progress_percentage = Some(60);
        assert_eq!(
            observer.ingest(&processing),
            Observation::Progress {
                status: SyncStatus::Processing,
                percentage: 60,
                current_step: Some("customers".to_string()),
            }
        );

        let mut completed = with(&base, SyncStatus::Completed);
        completed.progress_percentage = Some(100);
        assert_eq!(observer.ingest(&completed), Observation::JustCompleted);
        assert_eq!(observer.ingest(&completed), Observation::Ignored);
    }

    #[test]
    fn terminal_on_first_sight_reports_final_state_only() {
        let base = job(SyncStatus::Completed);
        let mut observer = JobObserver::new(base.id);
        assert!(matches!(
            observer.ingest(&base),
            Observation::AlreadyTerminal { status: SyncStatus::Completed, .. }
        ));
    }

    #[test]
    fn processing_to_queued_is_stale_and_queued_to_completed_is_valid() {
        let base = job(SyncStatus::Queued);
        let mut observer = JobObserver::new(base.id);
        observer.ingest(&with(&base, SyncStatus::Processing));
        assert_eq!(observer.ingest(&base), Observation::Stale);

        let mut trivial = JobObserver::new(base.id);
        trivial.ingest(&base);
        assert_eq!(
            trivial.ingest(&with(&base, SyncStatus::Completed)),
            Observation::JustCompleted
        );
    }

    #[test]
    fn failed_surfaces_the_backend_message_verbatim() {
        let base = job(SyncStatus::Processing);
        let mut observer = JobObserver::new(base.id);
        observer.ingest(&base);

        let mut failed = with(&base, SyncStatus::Failed);
        failed.error_message = Some("ORA-01017: invalid username/password".to_string());
        assert_eq!(
            observer.ingest(&failed),
            Observation::JustFailed {
                message: "ORA-01017: invalid username/password".to_string()
            }
        );
    }

    /// Serves a fixed script of snapshots, repeating the last one.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<SyncJob, BackendError>>>,
        last: Mutex<Option<SyncJob>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<SyncJob, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl SyncBackend for ScriptedBackend {
        async fn submit_job(
            &self,
            tenant_id: TenantId,
            spec: &SyncJobSpec,
        ) -> Result<SyncJob, BackendError> {
            Ok(SyncJob::queued(tenant_id, spec, 1))
        }

        async fn job_snapshot(
            &self,
            _tenant_id: TenantId,
            _job_id: SyncJobId,
        ) -> Result<Option<SyncJob>, BackendError> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(job)) => {
                    *self.last.lock().unwrap() = Some(job.clone());
                    Ok(Some(job))
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last.lock().unwrap().clone()),
            }
        }

        async fn pending_jobs_count(&self, _: TenantId, _: ProfileId) -> Result<usize, BackendError> {
            Ok(0)
        }
    }

    fn monitor(backend: Arc<ScriptedBackend>, max_failures: u32) -> (JobMonitor, Arc<SyncHistory>) {
        let history = Arc::new(SyncHistory::new());
        let settings = MonitorSettings {
            poll_interval: Duration::from_millis(5),
            max_consecutive_poll_failures: max_failures,
        };
        (JobMonitor::new(backend, history.clone(), settings), history)
    }

    async fn drain(watch: &mut JobWatch) -> Vec<JobUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = watch.next().await {
            updates.push(update);
        }
        updates
    }

    #[tokio::test]
    async fn watch_reports_progress_then_a_single_completion() {
        let base = job(SyncStatus::Queued);
        let mut processing = with(&base, SyncStatus::Processing);
        processing.current_step = Some("customers".to_string());
        processing.progress_percentage = Some(60);
        processing.started_at = Some(chrono::Utc::now());
        let mut completed = with(&processing, SyncStatus::Completed);
        completed.current_step = None;
        completed.progress_percentage = Some(100);

        let backend = ScriptedBackend::new(vec![
            Ok(processing.clone()),
            Ok(base.clone()),
            Ok(completed.clone()),
        ]);
        let (monitor, history) = monitor(backend, 3);

        let mut watch = monitor.watch(base.tenant_id, base.id).unwrap();
        let updates = drain(&mut watch).await;
        assert_eq!(watch.finish().await, Ok(SyncStatus::Completed));

        assert_eq!(updates.len(), 2, "stale queued snapshot is dropped: {updates:?}");
        assert!(matches!(updates[0], JobUpdate::Progress { percentage: 60, .. }));
        assert_eq!(
            updates[1],
            JobUpdate::Completed {
                job_id: base.id,
                notify: true
            }
        );
        assert!(history.has_succeeded(base.profile_id, EntityType::Customers));

        // Re-opening the watch reports the final state without re-announcing it.
        let mut again = monitor.watch(base.tenant_id, base.id).unwrap();
        let updates = drain(&mut again).await;
        assert_eq!(
            updates,
            vec![JobUpdate::Completed {
                job_id: base.id,
                notify: false
            }]
        );
    }

    #[tokio::test]
    async fn second_watch_of_the_same_job_is_rejected() {
        let base = job(SyncStatus::Processing);
        let backend = ScriptedBackend::new(vec![Ok(base.clone())]);
        let (monitor, _history) = monitor(backend, 3);

        let first = monitor.watch(base.tenant_id, base.id).unwrap();
        assert_eq!(
            monitor.watch(base.tenant_id, base.id).unwrap_err(),
            MonitorError::AlreadyWatched(base.id)
        );

        first.cancel();
        assert_eq!(first.finish().await, Err(MonitorError::Cancelled));
        assert!(monitor.watch(base.tenant_id, base.id).is_ok());
    }

    #[tokio::test]
    async fn transient_poll_errors_are_retried_up_to_the_budget() {
        let base = job(SyncStatus::Processing);
        let unavailable = BackendError::Unavailable("503".to_string());
        let backend = ScriptedBackend::new(vec![
            Err(unavailable.clone()),
            Ok(base.clone()),
            Err(unavailable.clone()),
            Err(unavailable.clone()),
        ]);
        let (monitor, _history) = monitor(backend, 2);

        let mut watch = monitor.watch(base.tenant_id, base.id).unwrap();
        let updates = drain(&mut watch).await;

        let errors = updates
            .iter()
            .filter(|u| matches!(u, JobUpdate::PollError { .. }))
            .count();
        assert_eq!(errors, 3);
        assert_eq!(
            watch.finish().await,
            Err(MonitorError::PollFailed {
                job_id: base.id,
                attempts: 2,
                last: unavailable,
            })
        );
    }

    #[tokio::test]
    async fn failed_job_never_advances_history() {
        let base = job(SyncStatus::Processing);
        let mut failed = with(&base, SyncStatus::Failed);
        failed.error_message = Some("timeout reading OINV".to_string());
        let backend = ScriptedBackend::new(vec![Ok(base.clone()), Ok(failed)]);
        let (monitor, history) = monitor(backend, 3);

        let mut watch = monitor.watch(base.tenant_id, base.id).unwrap();
        let updates = drain(&mut watch).await;

        assert_eq!(
            updates.last(),
            Some(&JobUpdate::Failed {
                job_id: base.id,
                message: "timeout reading OINV".to_string(),
                notify: true,
            })
        );
        assert!(!history.has_succeeded(base.profile_id, EntityType::Customers));
    }
}
