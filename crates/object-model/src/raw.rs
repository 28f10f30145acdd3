//! FortiOS/FortiManager records as returned by the REST and JSON-RPC APIs.
//!
//! Only the fields the analyzer reads are modeled; everything else is ignored.

use crate::{
    AddressKind, AddressObject, Device, Group, Policy, PolicyAction, RouteEntry, ServiceObject,
};
use serde::Deserialize;

/// A name reference: FortiOS returns `{"name": "x"}`, FortiManager often plain `"x"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NameRef {
    Named { name: String },
    Plain(String),
}

impl NameRef {
    pub fn into_name(self) -> String {
        match self {
            NameRef::Named { name } | NameRef::Plain(name) => name,
        }
    }
}

fn names(refs: Vec<NameRef>) -> Vec<String> {
    refs.into_iter().map(NameRef::into_name).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPolicy {
    pub policyid: u32,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub srcaddr: Vec<NameRef>,
    #[serde(default)]
    pub dstaddr: Vec<NameRef>,
    #[serde(default)]
    pub service: Vec<NameRef>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub logtraffic: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
}

impl From<RawPolicy> for Policy {
    fn from(raw: RawPolicy) -> Self {
        let enabled = raw
            .status
            .as_deref()
            .is_none_or(|s| s.eq_ignore_ascii_case("enable"));
        let action = match raw.action.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("accept") | Some("allow") | Some("ipsec") => PolicyAction::Allow,
            _ => PolicyAction::Deny,
        };
        let logging_enabled = matches!(
            raw.logtraffic.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("all") | Some("utm")
        );
        Policy {
            id: raw.policyid,
            enabled,
            source_addresses: names(raw.srcaddr),
            destination_addresses: names(raw.dstaddr),
            services: names(raw.service),
            action,
            name: raw.name.unwrap_or_default(),
            comments: raw.comments.unwrap_or_default(),
            logging_enabled,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAddress {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub subnet: Option<String>,
    #[serde(default, rename = "start-ip", alias = "start_ip")]
    pub start_ip: Option<String>,
    #[serde(default, rename = "end-ip", alias = "end_ip")]
    pub end_ip: Option<String>,
    #[serde(default)]
    pub fqdn: Option<String>,
}

impl From<RawAddress> for AddressObject {
    fn from(raw: RawAddress) -> Self {
        let kind = match raw.kind.as_deref().unwrap_or("ipmask") {
            "ipmask" => AddressKind::Ipmask {
                subnet: raw.subnet.unwrap_or_else(|| "0.0.0.0 0.0.0.0".to_string()),
            },
            "iprange" => AddressKind::Iprange {
                start_ip: raw.start_ip,
                end_ip: raw.end_ip,
            },
            "fqdn" => AddressKind::Fqdn { fqdn: raw.fqdn },
            "wildcard-fqdn" => AddressKind::WildcardFqdn { fqdn: raw.fqdn },
            other => AddressKind::Unknown {
                type_name: other.to_string(),
            },
        };
        AddressObject {
            name: raw.name,
            kind,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGroup {
    pub name: String,
    #[serde(default)]
    pub member: Vec<NameRef>,
}

impl From<RawGroup> for Group {
    fn from(raw: RawGroup) -> Self {
        Group {
            name: raw.name,
            members: names(raw.member),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawService {
    pub name: String,
    #[serde(default, rename = "tcp-portrange", alias = "tcp_portrange")]
    pub tcp_portrange: Option<String>,
    #[serde(default, rename = "udp-portrange", alias = "udp_portrange")]
    pub udp_portrange: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl From<RawService> for ServiceObject {
    fn from(raw: RawService) -> Self {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        ServiceObject {
            name: raw.name,
            tcp_port_ranges: non_empty(raw.tcp_portrange),
            udp_port_ranges: non_empty(raw.udp_portrange),
            protocol: raw.protocol,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRoute {
    #[serde(default)]
    pub dst: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
}

impl From<RawRoute> for RouteEntry {
    fn from(raw: RawRoute) -> Self {
        let gateway = raw
            .gateway
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty() && g != "0.0.0.0");
        RouteEntry {
            destination: raw.dst.unwrap_or_else(|| "0.0.0.0/0".to_string()),
            gateway,
            interface: raw.interface.or(raw.device).unwrap_or_default(),
        }
    }
}

/// One device's configuration as produced by the data loader.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceSnapshot {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub policies: Vec<RawPolicy>,
    #[serde(default)]
    pub addresses: Vec<RawAddress>,
    #[serde(default, alias = "addrgrp")]
    pub address_groups: Vec<RawGroup>,
    #[serde(default)]
    pub services: Vec<RawService>,
    #[serde(default, alias = "service_group")]
    pub service_groups: Vec<RawGroup>,
    #[serde(default, alias = "routes")]
    pub routing_table: Vec<RawRoute>,
}

impl DeviceSnapshot {
    pub fn into_device(self, id: &str) -> Device {
        Device {
            id: id.to_string(),
            display_name: self.name.unwrap_or_else(|| id.to_string()),
            description: self.desc.filter(|d| !d.is_empty()),
            policies: self.policies.into_iter().map(Policy::from).collect(),
            addresses: self.addresses.into_iter().map(AddressObject::from).collect(),
            address_groups: self.address_groups.into_iter().map(Group::from).collect(),
            services: self.services.into_iter().map(ServiceObject::from).collect(),
            service_groups: self.service_groups.into_iter().map(Group::from).collect(),
            routes: self.routing_table.into_iter().map(RouteEntry::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "name": "FW-DMZ",
        "desc": "dmz edge",
        "policies": [
            {"policyid": 7, "status": "enable", "srcaddr": [{"name": "all"}],
             "dstaddr": ["web"], "service": [{"name": "HTTPS"}],
             "action": "accept", "logtraffic": "utm", "name": "web-in"},
            {"policyid": 9, "status": "disable", "action": "deny"}
        ],
        "addresses": [
            {"name": "web", "subnet": "172.16.10.0 255.255.255.0"},
            {"name": "pool", "type": "iprange", "start-ip": "10.0.0.5", "end-ip": "10.0.0.9"},
            {"name": "cdn", "type": "fqdn", "fqdn": "cdn.example.com"},
            {"name": "kr", "type": "geography"}
        ],
        "addrgrp": [{"name": "servers", "member": [{"name": "web"}]}],
        "services": [{"name": "HTTPS", "tcp-portrange": "443", "udp-portrange": ""}],
        "routing_table": [
            {"dst": "0.0.0.0 0.0.0.0", "gateway": "203.0.113.1", "interface": "wan1"},
            {"dst": "172.16.10.0 255.255.255.0", "gateway": "0.0.0.0", "device": "dmz"}
        ]
    }"#;

    #[test]
    fn converts_fortios_records() {
        let snap: DeviceSnapshot = serde_json::from_str(SNAPSHOT).unwrap();
        let dev = snap.into_device("fw-dmz");
        assert_eq!(dev.id, "fw-dmz");
        assert_eq!(dev.display_name, "FW-DMZ");
        assert_eq!(dev.description.as_deref(), Some("dmz edge"));

        let p7 = dev.policy(7).unwrap();
        assert!(p7.enabled);
        assert_eq!(p7.action, PolicyAction::Allow);
        assert!(p7.logging_enabled);
        assert_eq!(p7.destination_addresses, vec!["web".to_string()]);
        let p9 = dev.policy(9).unwrap();
        assert!(!p9.enabled);
        assert!(!p9.logging_enabled);
        assert!(p9.services.is_empty());

        assert!(matches!(dev.address("web").unwrap().kind, AddressKind::Ipmask { .. }));
        assert!(matches!(dev.address("pool").unwrap().kind, AddressKind::Iprange { .. }));
        assert!(matches!(dev.address("cdn").unwrap().kind, AddressKind::Fqdn { .. }));
        assert_eq!(
            dev.address("kr").unwrap().kind,
            AddressKind::Unknown {
                type_name: "geography".into()
            }
        );
        assert_eq!(dev.address_group("servers").unwrap().members, vec!["web"]);

        let https = dev.service("HTTPS").unwrap();
        assert_eq!(https.tcp_port_ranges.as_deref(), Some("443"));
        assert_eq!(https.udp_port_ranges, None);

        assert_eq!(dev.routes[0].gateway.as_deref(), Some("203.0.113.1"));
        assert!(dev.routes[1].is_connected());
        assert_eq!(dev.routes[1].interface, "dmz");
    }

    #[test]
    fn missing_route_destination_defaults_to_any() {
        let route: RawRoute = serde_json::from_str(r#"{"gateway": "10.0.0.1", "interface": "wan"}"#).unwrap();
        let route = RouteEntry::from(route);
        assert_eq!(route.destination, "0.0.0.0/0");
    }

    #[test]
    fn missing_status_means_enabled() {
        let raw: RawPolicy = serde_json::from_str(r#"{"policyid": 1, "action": "allow"}"#).unwrap();
        let policy = Policy::from(raw);
        assert!(policy.enabled);
        assert_eq!(policy.action, PolicyAction::Allow);
    }
}
