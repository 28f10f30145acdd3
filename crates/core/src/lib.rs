#![forbid(unsafe_code)]

use object_model::Device;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

mod address;
mod advisor;
mod conflicts;
mod error;
mod loops;
mod matcher;
mod repository;
mod route;
mod service;
mod session;
mod topology;
mod tracer;
mod types;
mod zone;

pub use address::*;
pub use advisor::*;
pub use conflicts::*;
pub use error::*;
pub use loops::*;
pub use matcher::*;
pub use repository::*;
pub use route::*;
pub use service::*;
pub use session::*;
pub use topology::{DEFAULT_MAX_WALK, HopPlan, HopRole, TopologyResolver, infer_interface_for_ip};
pub use tracer::*;
pub use types::*;
pub use zone::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    pub zones: ZoneConfig,
    pub max_walk: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        AnalyzerSettings {
            zones: ZoneConfig::default(),
            max_walk: DEFAULT_MAX_WALK,
        }
    }
}

/// Loaded devices, trace sessions and the tracer in one place.
///
/// Loading takes `&mut self`; tracing only reads the device tables, so any number of
/// traces may run at once against a loaded analyzer.
#[derive(Debug, Default)]
pub struct PathAnalyzer {
    repository: DeviceRepository,
    sessions: SessionStore,
    tracer: PathTracer,
}

impl PathAnalyzer {
    pub fn new(settings: AnalyzerSettings) -> Self {
        PathAnalyzer {
            repository: DeviceRepository::new(),
            sessions: SessionStore::new(),
            tracer: PathTracer::new(TopologyResolver::new(settings.zones, settings.max_walk)),
        }
    }

    pub fn load_device(&mut self, device: Device) -> ReloadOutcome {
        self.repository.reload(device)
    }

    pub fn reload_device(&mut self, device: Device) -> ReloadOutcome {
        self.repository.reload(device)
    }

    pub fn unload_device(&mut self, id: &str) -> Option<Device> {
        self.repository.remove(id)
    }

    pub fn repository(&self) -> &DeviceRepository {
        &self.repository
    }

    pub fn trace(&self, request: &TraceRequest) -> TraceResult {
        self.tracer.trace(&self.repository, &self.sessions, request)
    }

    /// Results come back in request order; each request gets its own session.
    pub fn trace_batch(&self, requests: &[TraceRequest]) -> Vec<TraceResult> {
        let results: Vec<TraceResult> = requests.par_iter().map(|req| self.trace(req)).collect();
        let allowed = results.iter().filter(|r| r.allowed).count();
        let failed = results.iter().filter(|r| r.is_error()).count();
        info!(total = results.len(), allowed, failed, "batch trace finished");
        results
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.sessions.get(id)
    }

    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.sessions.list()
    }

    pub fn delete_session(&self, id: &str) -> bool {
        self.sessions.delete(id)
    }

    pub fn policy_conflicts(&self, device_id: &str) -> Option<Vec<PolicyConflict>> {
        self.repository.require(device_id).map(policy_conflicts)
    }

    pub fn routing_loops(&self) -> Vec<RoutingLoop> {
        routing_loops(&self.repository)
    }
}
