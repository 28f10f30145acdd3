use crate::{HopRole, Recommendation, Zone};
use chrono::{DateTime, Utc};
use object_model::{PolicyAction, Protocol};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// The tuple to simulate. Addresses stay strings so malformed input can be
/// reported in the result instead of rejected up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRequest {
    pub source_ip: String,
    pub destination_ip: String,
    pub port: u16,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl TraceRequest {
    pub fn new(source_ip: &str, destination_ip: &str, port: u16, protocol: Protocol) -> Self {
        TraceRequest {
            source_ip: source_ip.to_string(),
            destination_ip: destination_ip.to_string(),
            port,
            protocol,
            session_id: None,
        }
    }

    pub fn with_session(mut self, id: &str) -> Self {
        self.session_id = Some(id.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHop {
    pub hop_index: usize,
    pub device_id: String,
    pub device_name: String,
    pub hop_type: HopRole,
    pub ingress_interface: String,
    pub egress_interface: String,
    pub ingress_zone: Zone,
    pub egress_zone: Zone,
    pub matched_policy_id: Option<u32>,
    pub policy_name: Option<String>,
    /// `None` when no policy matched (implicit deny).
    pub action: Option<PolicyAction>,
    pub next_hop_ip: Option<Ipv4Addr>,
}

impl TraceHop {
    pub fn permits(&self) -> bool {
        self.action == Some(PolicyAction::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedBy {
    pub device_id: String,
    pub policy_id: Option<u32>,
    pub hop_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceResult {
    pub session_id: String,
    pub source_ip: String,
    pub destination_ip: String,
    pub port: u16,
    pub protocol: Protocol,
    pub allowed: bool,
    pub hops: Vec<TraceHop>,
    pub blocked_by: Option<BlockedBy>,
    pub source_zone: Zone,
    pub destination_zone: Zone,
    pub recommendations: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl TraceResult {
    pub(crate) fn start(session_id: String, request: &TraceRequest) -> Self {
        TraceResult {
            session_id,
            source_ip: request.source_ip.clone(),
            destination_ip: request.destination_ip.clone(),
            port: request.port,
            protocol: request.protocol,
            allowed: true,
            hops: Vec::new(),
            blocked_by: None,
            source_zone: Zone::Unknown,
            destination_zone: Zone::Unknown,
            recommendations: Vec::new(),
            error: None,
            analyzed_at: Utc::now(),
        }
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.allowed = false;
        self.error = Some(message.into());
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
