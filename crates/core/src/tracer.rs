use crate::{
    BlockedBy, DeviceRepository, HopPlan, PathOptimizationAdvisor, PolicyMatcher, SessionStatus,
    SessionStore, TopologyResolver, TraceError, TraceHop, TraceRequest, TraceResult,
};
use std::net::Ipv4Addr;
use tracing::{debug, error, info};
use uuid::Uuid;

pub const NO_PATH_ERROR: &str = "cannot determine firewall path";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TraceState {
    Init,
    ResolvingTopology,
    FailedNoTopology,
    EvaluatingHops,
    Blocked,
    CompletedAllowed,
    Optimizing,
    Done,
}

struct Progress<'s> {
    session: &'s str,
    state: TraceState,
}

impl Progress<'_> {
    fn enter(&mut self, next: TraceState) {
        debug!(session = self.session, from = ?self.state, to = ?next, "trace state");
        self.state = next;
    }
}

/// Drives topology resolution and per-hop policy evaluation for one tuple.
#[derive(Debug, Clone, Default)]
pub struct PathTracer {
    topology: TopologyResolver,
    advisor: PathOptimizationAdvisor,
}

impl PathTracer {
    pub fn new(topology: TopologyResolver) -> Self {
        PathTracer {
            topology,
            advisor: PathOptimizationAdvisor,
        }
    }

    /// Traces `request` and records the outcome in `sessions`.
    ///
    /// Failures are reported through `allowed = false` and `error` on the result;
    /// this never returns an error or panics on bad data.
    pub fn trace(
        &self,
        repo: &DeviceRepository,
        sessions: &SessionStore,
        request: &TraceRequest,
    ) -> TraceResult {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut progress = Progress {
            session: &session_id,
            state: TraceState::Init,
        };
        let mut result = TraceResult::start(session_id.clone(), request);
        let zones = self.topology.zones();
        result.source_zone = zones.classify(&request.source_ip);
        result.destination_zone = zones.classify(&request.destination_ip);

        let (src, dst) = match parse_endpoints(request) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(session = %session_id, error = %e, "trace rejected");
                result.fail(e.to_string());
                sessions.put(&session_id, SessionStatus::Error, result.clone());
                return result;
            }
        };

        progress.enter(TraceState::ResolvingTopology);
        let Some(plan) = self.topology.resolve_path(src, dst, repo) else {
            progress.enter(TraceState::FailedNoTopology);
            result.fail(NO_PATH_ERROR);
            sessions.put(&session_id, SessionStatus::Failed, result.clone());
            return result;
        };

        progress.enter(TraceState::EvaluatingHops);
        let status = match self.evaluate_hops(&plan, repo, src, dst, request, &mut result) {
            Ok(outcome) => {
                progress.enter(outcome);
                SessionStatus::Completed
            }
            Err(e) => {
                error!(session = %session_id, error = %e, hops = result.hops.len(), "hop evaluation failed");
                result.fail(e.to_string());
                SessionStatus::Error
            }
        };

        if status == SessionStatus::Completed && !result.hops.is_empty() {
            progress.enter(TraceState::Optimizing);
            result.recommendations = self.advisor.analyze(&result.hops, repo);
        }

        progress.enter(TraceState::Done);
        info!(
            session = %session_id,
            src = %src,
            dst = %dst,
            allowed = result.allowed,
            hops = result.hops.len(),
            "trace finished"
        );
        sessions.put(&session_id, status, result.clone());
        result
    }

    fn evaluate_hops(
        &self,
        plan: &[HopPlan],
        repo: &DeviceRepository,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        request: &TraceRequest,
        result: &mut TraceResult,
    ) -> Result<TraceState, TraceError> {
        let mut current_src = src;
        for (index, step) in plan.iter().enumerate() {
            let device = repo
                .require(&step.device_id)
                .ok_or_else(|| TraceError::DeviceNotLoaded(step.device_id.clone()))?;
            let policy = PolicyMatcher::new(device).match_policy(
                current_src,
                dst,
                request.port,
                request.protocol,
            );
            let hop = TraceHop {
                hop_index: index,
                device_id: device.id.clone(),
                device_name: device.display_name.clone(),
                hop_type: step.role,
                ingress_interface: step.ingress_interface.clone(),
                egress_interface: step.egress_interface.clone(),
                ingress_zone: step.ingress_zone,
                egress_zone: step.egress_zone,
                matched_policy_id: policy.map(|p| p.id),
                policy_name: policy.map(|p| p.name.clone()).filter(|n| !n.is_empty()),
                action: policy.map(|p| p.action),
                next_hop_ip: step.next_hop_ip,
            };
            let permitted = hop.permits();
            result.hops.push(hop);
            if !permitted {
                result.allowed = false;
                result.blocked_by = Some(BlockedBy {
                    device_id: device.id.clone(),
                    policy_id: policy.map(|p| p.id),
                    hop_index: index,
                });
                return Ok(TraceState::Blocked);
            }
            if let Some(gateway) = step.next_hop_ip {
                current_src = gateway;
            }
        }
        Ok(TraceState::CompletedAllowed)
    }
}

fn parse_endpoints(request: &TraceRequest) -> Result<(Ipv4Addr, Ipv4Addr), TraceError> {
    let parse = |field: &'static str, input: &str| {
        input
            .trim()
            .parse::<Ipv4Addr>()
            .map_err(|_| TraceError::InvalidAddress {
                field,
                input: input.to_string(),
            })
    };
    Ok((
        parse("source", &request.source_ip)?,
        parse("destination", &request.destination_ip)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Zone;
    use object_model::{Device, Policy, PolicyAction, Protocol};

    fn single(action: PolicyAction) -> DeviceRepository {
        let mut device = Device::new("fw1");
        device.policies = vec![Policy::new(1, action)];
        [device].into_iter().collect()
    }

    #[test]
    fn malformed_source_is_an_error_session() {
        let sessions = SessionStore::new();
        let req = TraceRequest::new("10.0.0.300", "10.0.0.1", 22, Protocol::Tcp);
        let result = PathTracer::default().trace(&single(PolicyAction::Allow), &sessions, &req);
        assert!(!result.allowed);
        assert!(result.error.as_deref().unwrap().contains("10.0.0.300"));
        assert_eq!(result.source_zone, Zone::Unknown);
        let stored = sessions.get(&result.session_id).unwrap();
        assert_eq!(stored.status, SessionStatus::Error);
    }

    #[test]
    fn empty_repository_fails_without_path() {
        let sessions = SessionStore::new();
        let req = TraceRequest::new("10.0.0.1", "10.0.0.2", 22, Protocol::Tcp).with_session("s1");
        let result = PathTracer::default().trace(&DeviceRepository::new(), &sessions, &req);
        assert_eq!(result.session_id, "s1");
        assert!(!result.allowed);
        assert_eq!(result.error.as_deref(), Some(NO_PATH_ERROR));
        assert!(result.hops.is_empty());
        assert_eq!(sessions.get("s1").unwrap().status, SessionStatus::Failed);
    }

    #[test]
    fn implicit_deny_has_no_action() {
        let mut device = Device::new("fw1");
        device.policies = vec![Policy::new(1, PolicyAction::Allow).disabled()];
        let repo: DeviceRepository = [device].into_iter().collect();
        let sessions = SessionStore::new();
        let req = TraceRequest::new("192.168.1.5", "192.168.1.6", 443, Protocol::Tcp);
        let result = PathTracer::default().trace(&repo, &sessions, &req);
        assert!(!result.allowed);
        assert!(result.error.is_none());
        assert_eq!(result.hops.len(), 1);
        assert_eq!(result.hops[0].action, None);
        assert_eq!(result.hops[0].matched_policy_id, None);
        let blocked = result.blocked_by.unwrap();
        assert_eq!(blocked.policy_id, None);
        assert_eq!(blocked.hop_index, 0);
    }

    #[test]
    fn missing_device_mid_trace_keeps_partial_hops() {
        let repo = single(PolicyAction::Allow);
        let plan = vec![
            HopPlan {
                device_id: "fw1".to_string(),
                role: crate::HopRole::Source,
                ingress_interface: "port1".to_string(),
                egress_interface: "port2".to_string(),
                ingress_zone: Zone::Internal,
                egress_zone: Zone::External,
                next_hop_ip: Some(Ipv4Addr::new(10, 0, 0, 2)),
            },
            HopPlan {
                device_id: "gone".to_string(),
                role: crate::HopRole::Destination,
                ingress_interface: "port1".to_string(),
                egress_interface: "port2".to_string(),
                ingress_zone: Zone::External,
                egress_zone: Zone::External,
                next_hop_ip: None,
            },
        ];
        let req = TraceRequest::new("192.168.1.5", "8.8.8.8", 53, Protocol::Udp);
        let mut result = TraceResult::start("x".to_string(), &req);
        let err = PathTracer::default()
            .evaluate_hops(
                &plan,
                &repo,
                Ipv4Addr::new(192, 168, 1, 5),
                Ipv4Addr::new(8, 8, 8, 8),
                &req,
                &mut result,
            )
            .unwrap_err();
        assert_eq!(err, TraceError::DeviceNotLoaded("gone".to_string()));
        assert_eq!(result.hops.len(), 1);
    }
}
