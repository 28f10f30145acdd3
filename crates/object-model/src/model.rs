use crate::{Ipv4Network, ParseError, parse_network};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Address reference that matches every IP.
pub const ANY_ADDRESS: &str = "all";
/// Service reference that matches every port and protocol (compared case-insensitively).
pub const ANY_SERVICE: &str = "ALL";

pub fn is_any_address(name: &str) -> bool {
    name == ANY_ADDRESS
}

pub fn is_any_service(name: &str) -> bool {
    name.eq_ignore_ascii_case(ANY_SERVICE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AddressKind {
    Ipmask {
        subnet: String,
    },
    Iprange {
        start_ip: Option<String>,
        end_ip: Option<String>,
    },
    Fqdn {
        fqdn: Option<String>,
    },
    WildcardFqdn {
        fqdn: Option<String>,
    },
    /// A FortiOS type this model does not evaluate (geography, dynamic, ...).
    Unknown {
        type_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressObject {
    pub name: String,
    #[serde(flatten)]
    pub kind: AddressKind,
}

impl AddressObject {
    pub fn ipmask(name: &str, subnet: &str) -> Self {
        AddressObject {
            name: name.to_string(),
            kind: AddressKind::Ipmask {
                subnet: subnet.to_string(),
            },
        }
    }

    pub fn iprange(name: &str, start_ip: &str, end_ip: &str) -> Self {
        AddressObject {
            name: name.to_string(),
            kind: AddressKind::Iprange {
                start_ip: Some(start_ip.to_string()),
                end_ip: Some(end_ip.to_string()),
            },
        }
    }

    pub fn fqdn(name: &str, fqdn: &str) -> Self {
        AddressObject {
            name: name.to_string(),
            kind: AddressKind::Fqdn {
                fqdn: Some(fqdn.to_string()),
            },
        }
    }
}

/// Named collection of address or service names; members may name other groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub members: Vec<String>,
}

impl Group {
    pub fn new(name: &str, members: &[&str]) -> Self {
        Group {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }
}

pub type AddressGroup = Group;
pub type ServiceGroup = Group;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceObject {
    pub name: String,
    pub tcp_port_ranges: Option<String>,
    pub udp_port_ranges: Option<String>,
    pub protocol: Option<String>,
}

impl ServiceObject {
    pub fn tcp(name: &str, ports: &str) -> Self {
        ServiceObject {
            name: name.to_string(),
            tcp_port_ranges: Some(ports.to_string()),
            ..Default::default()
        }
    }

    pub fn udp(name: &str, ports: &str) -> Self {
        ServiceObject {
            name: name.to_string(),
            udp_port_ranges: Some(ports.to_string()),
            ..Default::default()
        }
    }

    pub fn icmp(name: &str) -> Self {
        ServiceObject {
            name: name.to_string(),
            protocol: Some("ICMP".to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub destination: String,
    pub gateway: Option<String>,
    pub interface: String,
}

impl RouteEntry {
    pub fn connected(destination: &str, interface: &str) -> Self {
        RouteEntry {
            destination: destination.to_string(),
            gateway: None,
            interface: interface.to_string(),
        }
    }

    pub fn via(destination: &str, gateway: &str, interface: &str) -> Self {
        RouteEntry {
            destination: destination.to_string(),
            gateway: Some(gateway.to_string()),
            interface: interface.to_string(),
        }
    }

    pub fn network(&self) -> Result<Ipv4Network, ParseError> {
        parse_network(&self.destination)
    }

    pub fn is_connected(&self) -> bool {
        self.gateway.is_none()
    }

    /// Gateway address, `None` for a directly connected network.
    pub fn next_hop(&self) -> Result<Option<Ipv4Addr>, ParseError> {
        match &self.gateway {
            None => Ok(None),
            Some(gw) => gw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ParseError::invalid("gateway", gw)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Allow,
    Deny,
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyAction::Allow => f.write_str("allow"),
            PolicyAction::Deny => f.write_str("deny"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: u32,
    pub enabled: bool,
    pub source_addresses: Vec<String>,
    pub destination_addresses: Vec<String>,
    pub services: Vec<String>,
    pub action: PolicyAction,
    pub name: String,
    pub comments: String,
    pub logging_enabled: bool,
}

impl Policy {
    pub fn new(id: u32, action: PolicyAction) -> Self {
        Policy {
            id,
            enabled: true,
            source_addresses: vec![ANY_ADDRESS.to_string()],
            destination_addresses: vec![ANY_ADDRESS.to_string()],
            services: vec![ANY_SERVICE.to_string()],
            action,
            name: String::new(),
            comments: String::new(),
            logging_enabled: true,
        }
    }

    pub fn with_sources(mut self, names: &[&str]) -> Self {
        self.source_addresses = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_destinations(mut self, names: &[&str]) -> Self {
        self.destination_addresses = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_services(mut self, names: &[&str]) -> Self {
        self.services = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn without_logging(mut self) -> Self {
        self.logging_enabled = false;
        self
    }

    pub fn any_source(&self) -> bool {
        self.source_addresses.iter().any(|n| is_any_address(n))
    }

    pub fn any_destination(&self) -> bool {
        self.destination_addresses.iter().any(|n| is_any_address(n))
    }

    pub fn any_service(&self) -> bool {
        self.services.iter().any(|n| is_any_service(n))
    }
}

/// One firewall with the configuration tables loaded for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub display_name: String,
    pub description: Option<String>,
    pub policies: Vec<Policy>,
    pub addresses: Vec<AddressObject>,
    pub address_groups: Vec<AddressGroup>,
    pub services: Vec<ServiceObject>,
    pub service_groups: Vec<ServiceGroup>,
    pub routes: Vec<RouteEntry>,
}

impl Device {
    pub fn new(id: &str) -> Self {
        Device {
            id: id.to_string(),
            display_name: id.to_string(),
            ..Default::default()
        }
    }

    pub fn address(&self, name: &str) -> Option<&AddressObject> {
        self.addresses.iter().find(|a| a.name == name)
    }

    pub fn address_group(&self, name: &str) -> Option<&AddressGroup> {
        self.address_groups.iter().find(|g| g.name == name)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceObject> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn service_group(&self, name: &str) -> Option<&ServiceGroup> {
        self.service_groups.iter().find(|g| g.name == name)
    }

    pub fn policy(&self, id: u32) -> Option<&Policy> {
        self.policies.iter().find(|p| p.id == id)
    }

    /// Name and description, lowercased, for zone heuristics.
    pub fn label(&self) -> String {
        let mut label = self.display_name.to_ascii_lowercase();
        if let Some(desc) = &self.description {
            label.push(' ');
            label.push_str(&desc.to_ascii_lowercase());
        }
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards() {
        assert!(is_any_address("all"));
        assert!(!is_any_address("ALL"));
        assert!(is_any_service("all"));
        assert!(is_any_service("ALL"));
        assert!(!is_any_service("HTTPS"));
    }

    #[test]
    fn route_next_hop() {
        let connected = RouteEntry::connected("10.0.0.0/24", "port1");
        assert!(connected.is_connected());
        assert_eq!(connected.next_hop().unwrap(), None);

        let via = RouteEntry::via("0.0.0.0/0", "10.0.0.254", "wan1");
        assert_eq!(via.next_hop().unwrap(), Some("10.0.0.254".parse().unwrap()));

        let broken = RouteEntry::via("0.0.0.0/0", "gw.example", "wan1");
        assert!(broken.next_hop().is_err());
    }

    #[test]
    fn address_kind_serializes_with_tag() {
        let obj = AddressObject::ipmask("lan", "192.168.1.0 255.255.255.0");
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["kind"], "ipmask");
        assert_eq!(json["subnet"], "192.168.1.0 255.255.255.0");
    }

    #[test]
    fn device_label_includes_description() {
        let mut dev = Device::new("fw1");
        dev.display_name = "FW-Core".into();
        dev.description = Some("Internal Edge".into());
        assert_eq!(dev.label(), "fw-core internal edge");
    }
}
