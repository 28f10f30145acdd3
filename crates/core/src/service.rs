use object_model::{Device, ParseError, Protocol, ServiceObject, is_any_service, parse_port_ranges};
use std::collections::HashSet;
use tracing::{error, trace};

/// Decides whether a (port, protocol) pair is covered by a named service or group.
#[derive(Debug, Clone, Copy)]
pub struct ServiceResolver<'a> {
    device: &'a Device,
}

impl<'a> ServiceResolver<'a> {
    pub fn new(device: &'a Device) -> Self {
        ServiceResolver { device }
    }

    pub fn resolves(&self, port: u16, protocol: Protocol, name: &str) -> bool {
        let mut visited = HashSet::new();
        self.resolve_name(port, protocol, name, &mut visited)
    }

    fn resolve_name(
        &self,
        port: u16,
        protocol: Protocol,
        name: &str,
        visited: &mut HashSet<&'a str>,
    ) -> bool {
        if is_any_service(name) {
            return true;
        }
        if let Some(group) = self.device.service_group(name) {
            if !visited.insert(group.name.as_str()) {
                trace!(device = %self.device.id, group = name, "service group revisited");
                return false;
            }
            return group
                .members
                .iter()
                .any(|member| self.resolve_name(port, protocol, member, visited));
        }
        match self.device.service(name) {
            Some(svc) => match matches_service(port, protocol, svc) {
                Ok(hit) => hit,
                Err(e) => {
                    error!(device = %self.device.id, service = name, error = %e, "service evaluation failed");
                    false
                }
            },
            None => {
                trace!(device = %self.device.id, service = name, "unresolved service reference");
                false
            }
        }
    }
}

/// Tests one service object. ICMP ignores the port.
pub fn matches_service(port: u16, protocol: Protocol, svc: &ServiceObject) -> Result<bool, ParseError> {
    let ranges = match protocol {
        Protocol::Icmp => return Ok(svc.protocol.as_deref() == Some("ICMP")),
        Protocol::Tcp => svc.tcp_port_ranges.as_deref(),
        Protocol::Udp => svc.udp_port_ranges.as_deref(),
    };
    match ranges {
        Some(text) => Ok(parse_port_ranges(text)?.iter().any(|r| r.contains(port))),
        None => Ok(false),
    }
}
