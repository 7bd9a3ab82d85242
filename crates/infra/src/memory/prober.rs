use std::collections::HashSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use taxlink_connections::{ConnectionPath, ConnectionProber, ConnectionProfile};

/// Answers probes from a set of reachable paths, after a fixed latency.
#[derive(Debug)]
pub struct SimulatedProber {
    reachable: RwLock<HashSet<ConnectionPath>>,
    latency: Duration,
    probes: AtomicUsize,
}

impl Default for SimulatedProber {
    fn default() -> Self {
        Self::new(Duration::from_millis(5))
    }
}

impl SimulatedProber {
    /// Both paths reachable.
    pub fn new(latency: Duration) -> Self {
        Self {
            reachable: RwLock::new(HashSet::from([ConnectionPath::Api, ConnectionPath::Database])),
            latency,
            probes: AtomicUsize::new(0),
        }
    }

    pub fn set_reachable(&self, path: ConnectionPath, reachable: bool) {
        let mut paths = self.reachable.write().unwrap_or_else(|p| p.into_inner());
        if reachable {
            paths.insert(path);
        } else {
            paths.remove(&path);
        }
    }

    /// Number of probes answered so far.
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProber for SimulatedProber {
    async fn probe(&self, profile: &ConnectionProfile, path: ConnectionPath) -> Result<String, String> {
        tokio::time::sleep(self.latency).await;
        self.probes.fetch_add(1, Ordering::SeqCst);

        let host = &profile.server_details.host;
        let port = profile.port_for(path);
        let up = self
            .reachable
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&path);
        if up {
            Ok(format!("{} {} reachable at {host}:{port}", profile.erp_type, path.label()))
        } else {
            Err(format!("connection refused by {host}:{port}"))
        }
    }
}
