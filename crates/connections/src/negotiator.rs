//! Connection negotiation: which path to test, in what order, and what the
//! outcome means.
//!
//! API is always the primary path. The database path is tried only when API
//! credentials are absent or the API test failed; the two are never raced.
//! Tests are coalesced per subject: an identical test already in flight is
//! shared, and at most one network test runs per subject at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use taxlink_core::{ProfileId, TenantId};

use crate::profile::{ConnectionPath, ConnectionProfile};

/// Network probe for a single connection path.
///
/// `Ok` carries a short server-reported detail, `Err` the failure reason.
#[async_trait]
pub trait ConnectionProber: Send + Sync {
    async fn probe(&self, profile: &ConnectionProfile, path: ConnectionPath) -> Result<String, String>;
}

/// Outcome of a connection test. Never mutates persisted state by itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub path_tested: ConnectionPath,
    pub message: String,
    pub tested_at: DateTime<Utc>,
}

impl ConnectionTestResult {
    fn succeeded(path: ConnectionPath, message: String) -> Self {
        Self {
            success: true,
            path_tested: path,
            message,
            tested_at: Utc::now(),
        }
    }

    fn failed(path: ConnectionPath, message: String) -> Self {
        Self {
            success: false,
            path_tested: path,
            message,
            tested_at: Utc::now(),
        }
    }
}

/// What a test is coalesced against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestSubject {
    /// Unsaved profile payload, scoped to the submitting tenant.
    Draft(TenantId),
    /// Persisted profile.
    Saved(ProfileId),
}

impl TestSubject {
    pub fn for_profile(profile: &ConnectionProfile) -> Self {
        match profile.id {
            Some(id) => TestSubject::Saved(id),
            None => TestSubject::Draft(profile.tenant_id),
        }
    }
}

type ResultRx = watch::Receiver<Option<ConnectionTestResult>>;

#[derive(Debug)]
struct PendingTest {
    generation: u64,
    fingerprint: String,
    rx: ResultRx,
}

#[derive(Debug, Default)]
struct NegotiatorState {
    next_generation: u64,
    /// Most recently dispatched test per subject.
    pending: HashMap<TestSubject, PendingTest>,
    /// Serializes network tests per subject.
    lanes: HashMap<TestSubject, Arc<tokio::sync::Mutex<()>>>,
}

/// Chooses and runs connection tests.
#[derive(Clone)]
pub struct ConnectionNegotiator {
    prober: Arc<dyn ConnectionProber>,
    state: Arc<Mutex<NegotiatorState>>,
}

impl ConnectionNegotiator {
    pub fn new(prober: Arc<dyn ConnectionProber>) -> Self {
        Self {
            prober,
            state: Arc::new(Mutex::new(NegotiatorState::default())),
        }
    }

    /// Test `profile`, optionally restricted to one `path`.
    ///
    /// Once dispatched, the test runs to completion even if the caller stops
    /// waiting; later identical requests for the same subject share its result.
    pub async fn test(
        &self,
        subject: TestSubject,
        profile: &ConnectionProfile,
        path: Option<ConnectionPath>,
    ) -> ConnectionTestResult {
        let fingerprint = fingerprint(profile, path);

        let mut rx = {
            let mut state = lock(&self.state);
            match state.pending.get(&subject) {
                Some(pending) if pending.fingerprint == fingerprint => {
                    tracing::debug!(?subject, "joining in-flight connection test");
                    pending.rx.clone()
                }
                _ => self.dispatch(&mut state, subject, fingerprint, profile.clone(), path),
            }
        };

        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|result| result.clone());

        outcome.unwrap_or_else(|| {
            ConnectionTestResult::failed(
                path.unwrap_or(ConnectionPath::Api),
                "connection test ended without a result".to_string(),
            )
        })
    }

    fn dispatch(
        &self,
        state: &mut NegotiatorState,
        subject: TestSubject,
        fingerprint: String,
        profile: ConnectionProfile,
        path: Option<ConnectionPath>,
    ) -> ResultRx {
        let (tx, rx) = watch::channel(None);

        state.next_generation += 1;
        let generation = state.next_generation;
        state.pending.insert(
            subject,
            PendingTest {
                generation,
                fingerprint,
                rx: rx.clone(),
            },
        );
        let lane = state.lanes.entry(subject).or_default().clone();

        let prober = self.prober.clone();
        let shared = self.state.clone();
        tokio::spawn(async move {
            let turn = lane.lock().await;
            let result = negotiate(prober.as_ref(), &profile, path).await;
            tracing::info!(
                ?subject,
                success = result.success,
                path = result.path_tested.label(),
                "connection test finished"
            );
            let _ = tx.send(Some(result));
            drop(turn);

            let mut state = lock(&shared);
            if state
                .pending
                .get(&subject)
                .is_some_and(|p| p.generation == generation)
            {
                state.pending.remove(&subject);
            }
            // Lanes are only cloned under the state lock, so the map's copy
            // plus ours means nobody else is queued on it.
            let idle = state
                .lanes
                .get(&subject)
                .is_some_and(|l| Arc::ptr_eq(l, &lane) && Arc::strong_count(&lane) == 2);
            if idle {
                state.lanes.remove(&subject);
            }
        });

        rx
    }
}

#[cfg(test)]
impl ConnectionNegotiator {
    fn tracked_subjects(&self) -> (usize, usize) {
        let state = lock(&self.state);
        (state.pending.len(), state.lanes.len())
    }
}

async fn negotiate(
    prober: &dyn ConnectionProber,
    profile: &ConnectionProfile,
    path: Option<ConnectionPath>,
) -> ConnectionTestResult {
    if let Some(path) = path {
        return run_path(prober, profile, path).await;
    }

    if api_prerequisites(profile).is_err() {
        return run_path(prober, profile, ConnectionPath::Database).await;
    }

    let api = run_path(prober, profile, ConnectionPath::Api).await;
    if api.success || database_prerequisites(profile).is_err() {
        return api;
    }

    tracing::info!(profile = ?profile.id, "API test failed; falling back to database");
    let db = run_path(prober, profile, ConnectionPath::Database).await;
    let message = format!("{}; {}", api.message, db.message);
    if db.success {
        ConnectionTestResult::succeeded(ConnectionPath::Database, message)
    } else {
        ConnectionTestResult::failed(ConnectionPath::Database, message)
    }
}

async fn run_path(
    prober: &dyn ConnectionProber,
    profile: &ConnectionProfile,
    path: ConnectionPath,
) -> ConnectionTestResult {
    let ready = match path {
        ConnectionPath::Api => api_prerequisites(profile),
        ConnectionPath::Database => database_prerequisites(profile),
    };
    if let Err(missing) = ready {
        return ConnectionTestResult::failed(
            path,
            format!("{} connection not attempted: {}", path.label(), missing),
        );
    }

    match prober.probe(profile, path).await {
        Ok(detail) => ConnectionTestResult::succeeded(
            path,
            format!("{} connection succeeded: {}", path.label(), detail),
        ),
        Err(reason) => ConnectionTestResult::failed(
            path,
            format!("{} connection failed: {}", path.label(), reason),
        ),
    }
}

fn api_prerequisites(profile: &ConnectionProfile) -> Result<(), &'static str> {
    if !profile.erp_type.schema().supports_api() {
        return Err("the ERP type has no API");
    }
    if !profile.has_api_credentials() {
        return Err("API credentials are incomplete");
    }
    if profile.server_details.host.trim().is_empty() {
        return Err("host is missing");
    }
    Ok(())
}

fn database_prerequisites(profile: &ConnectionProfile) -> Result<(), &'static str> {
    if !profile.has_db_credentials() {
        return Err("database credentials are incomplete");
    }
    if profile.server_details.host.trim().is_empty() {
        return Err("host is missing");
    }
    if profile.database_name().is_none() {
        return Err("database name is missing");
    }
    Ok(())
}

/// Identity of a test request: everything that can change its outcome.
fn fingerprint(profile: &ConnectionProfile, path: Option<ConnectionPath>) -> String {
    serde_json::to_string(&(
        profile.erp_type,
        &profile.server_details,
        &profile.api_credentials,
        &profile.db_credentials,
        path,
    ))
    .unwrap_or_default()
}

fn lock(state: &Mutex<NegotiatorState>) -> MutexGuard<'_, NegotiatorState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erp::ErpType;
    use crate::profile::{Credentials, DbCredentials, ServerDetails};
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records every probe and answers from a fixed table.
    struct ScriptedProber {
        api_ok: bool,
        db_ok: bool,
        delay: Duration,
        calls: Mutex<Vec<ConnectionPath>>,
        concurrent: AtomicUsize,
        max_concurrent: AtomicUsize,
    }

    impl ScriptedProber {
        fn new(api_ok: bool, db_ok: bool) -> Self {
            Self {
                api_ok,
                db_ok,
                delay: Duration::from_millis(0),
                calls: Mutex::new(Vec::new()),
                concurrent: AtomicUsize::new(0),
                max_concurrent: AtomicUsize::new(0),
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> Vec<ConnectionPath> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConnectionProber for ScriptedProber {
        async fn probe(
            &self,
            _profile: &ConnectionProfile,
            path: ConnectionPath,
        ) -> Result<String, String> {
            self.calls.lock().unwrap().push(path);
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);

            let ok = match path {
                ConnectionPath::Api => self.api_ok,
                ConnectionPath::Database => self.db_ok,
            };
            if ok { Ok("ok".to_string()) } else { Err("refused".to_string()) }
        }
    }

    fn sage_profile() -> ConnectionProfile {
        let mut details = ServerDetails::new("x3.local");
        details.pool_alias = Some("SEED".to_string());
        ConnectionProfile::draft(
            TenantId::new(),
            ErpType::SageX3,
            details,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        )
    }

    fn with_both(profile: ConnectionProfile) -> ConnectionProfile {
        profile
            .with_api_credentials(Credentials::new("u", "p"))
            .with_db_credentials(DbCredentials::new("sa", "pw").with_database("X3"))
    }

    #[tokio::test]
    async fn database_only_profile_never_tries_the_api() {
        let prober = Arc::new(ScriptedProber::new(true, true));
        let negotiator = ConnectionNegotiator::new(prober.clone());
        let profile = sage_profile()
            .with_db_credentials(DbCredentials::new("sa", "pw").with_database("X3"));

        let result = negotiator
            .test(TestSubject::for_profile(&profile), &profile, None)
            .await;

        assert!(result.success);
        assert_eq!(result.path_tested, ConnectionPath::Database);
        assert_eq!(prober.calls(), vec![ConnectionPath::Database]);
    }

    #[tokio::test]
    async fn api_success_skips_the_database() {
        let prober = Arc::new(ScriptedProber::new(true, true));
        let negotiator = ConnectionNegotiator::new(prober.clone());
        let profile = with_both(sage_profile());

        let result = negotiator
            .test(TestSubject::for_profile(&profile), &profile, None)
            .await;

        assert!(result.success);
        assert_eq!(result.path_tested, ConnectionPath::Api);
        assert_eq!(prober.calls(), vec![ConnectionPath::Api]);
    }

    #[tokio::test]
    async fn api_failure_falls_back_and_names_both_legs() {
        let prober = Arc::new(ScriptedProber::new(false, false));
        let negotiator = ConnectionNegotiator::new(prober.clone());
        let profile = with_both(sage_profile());

        let result = negotiator
            .test(TestSubject::for_profile(&profile), &profile, None)
            .await;

        assert!(!result.success);
        assert_eq!(result.path_tested, ConnectionPath::Database);
        assert!(result.message.contains("API connection failed"));
        assert!(result.message.contains("database connection failed"));
        assert_eq!(
            prober.calls(),
            vec![ConnectionPath::Api, ConnectionPath::Database]
        );
    }

    #[tokio::test]
    async fn explicit_path_with_missing_prerequisites_fails_fast() {
        let prober = Arc::new(ScriptedProber::new(true, true));
        let negotiator = ConnectionNegotiator::new(prober.clone());
        let profile = sage_profile().with_api_credentials(Credentials::new("u", "p"));

        let result = negotiator
            .test(
                TestSubject::for_profile(&profile),
                &profile,
                Some(ConnectionPath::Database),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.path_tested, ConnectionPath::Database);
        assert!(result.message.contains("not attempted"));
        assert!(prober.calls().is_empty());
    }

    #[tokio::test]
    async fn explicit_api_path_does_not_fall_back() {
        let prober = Arc::new(ScriptedProber::new(false, true));
        let negotiator = ConnectionNegotiator::new(prober.clone());
        let profile = with_both(sage_profile());

        let result = negotiator
            .test(
                TestSubject::for_profile(&profile),
                &profile,
                Some(ConnectionPath::Api),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.path_tested, ConnectionPath::Api);
        assert!(!result.message.contains("database"));
        assert_eq!(prober.calls(), vec![ConnectionPath::Api]);
    }

    #[tokio::test]
    async fn finished_subjects_are_forgotten() {
        let prober = Arc::new(ScriptedProber::new(true, true));
        let negotiator = ConnectionNegotiator::new(prober.clone());

        for _ in 0..3 {
            let mut profile = with_both(sage_profile());
            profile.id = Some(ProfileId::new());
            negotiator
                .test(TestSubject::for_profile(&profile), &profile, None)
                .await;
        }

        // The result is published before the task tidies up.
        for _ in 0..100 {
            if negotiator.tracked_subjects() == (0, 0) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(negotiator.tracked_subjects(), (0, 0));
    }

    #[tokio::test]
    async fn identical_concurrent_tests_are_coalesced() {
        let prober = Arc::new(ScriptedProber::new(true, true).slow(Duration::from_millis(50)));
        let negotiator = ConnectionNegotiator::new(prober.clone());
        let mut profile = with_both(sage_profile());
        profile.id = Some(ProfileId::new());
        let subject = TestSubject::for_profile(&profile);

        let (a, b) = tokio::join!(
            negotiator.test(subject, &profile, None),
            negotiator.test(subject, &profile, None),
        );

        assert_eq!(a, b);
        assert_eq!(prober.calls(), vec![ConnectionPath::Api]);
    }

    #[tokio::test]
    async fn different_credentials_wait_their_turn() {
        let prober = Arc::new(ScriptedProber::new(true, true).slow(Duration::from_millis(20)));
        let negotiator = ConnectionNegotiator::new(prober.clone());
        let mut first = with_both(sage_profile());
        first.id = Some(ProfileId::new());
        let mut second = first.clone();
        second.api_credentials = Some(Credentials::new("other", "secret"));
        let subject = TestSubject::for_profile(&first);

        let (a, b) = tokio::join!(
            negotiator.test(subject, &first, None),
            negotiator.test(subject, &second, None),
        );

        assert!(a.success && b.success);
        assert_eq!(prober.calls().len(), 2);
        assert_eq!(prober.max_concurrent.load(Ordering::SeqCst), 1);
    }
}
