//! In-memory collaborators.
//!
//! Stand-ins for the ERP, the sync worker fleet, the compliance backend and
//! the provider registry. Used by the simulator and the integration tests;
//! each one can be scripted to fail.

mod gateway;
mod profiles;
mod prober;
mod providers;
mod sync_backend;

use std::sync::Arc;

pub use gateway::InMemoryComplianceGateway;
pub use profiles::InMemoryProfileStore;
pub use prober::SimulatedProber;
pub use providers::InMemoryProviderBackend;
pub use sync_backend::{SIMULATED_STEPS, SimulatedSyncBackend};

use crate::platform::Collaborators;

/// Concrete handles to every in-memory collaborator, for scripting.
#[derive(Clone, Default)]
pub struct InMemoryCollaborators {
    pub profiles: Arc<InMemoryProfileStore>,
    pub prober: Arc<SimulatedProber>,
    pub sync_backend: Arc<SimulatedSyncBackend>,
    pub gateway: Arc<InMemoryComplianceGateway>,
    pub providers: Arc<InMemoryProviderBackend>,
}

impl InMemoryCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            profiles: self.profiles.clone(),
            prober: self.prober.clone(),
            sync_backend: self.sync_backend.clone(),
            gateway: self.gateway.clone(),
            providers: self.providers.clone(),
        }
    }
}
