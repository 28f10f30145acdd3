use object_model::{Ipv4Network, parse_network};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Coarse network segment used for path heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Internal,
    Dmz,
    External,
    Unknown,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Internal => "internal",
            Zone::Dmz => "dmz",
            Zone::External => "external",
            Zone::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DMZ and internal ranges. DMZ ranges are checked first so carve-outs inside
/// the private space win over the broader internal ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub dmz: Vec<Ipv4Network>,
    pub internal: Vec<Ipv4Network>,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        let nets = |cidrs: &[&str]| cidrs.iter().filter_map(|c| parse_network(c).ok()).collect();
        ZoneConfig {
            dmz: nets(&["10.10.0.0/16", "172.16.10.0/24"]),
            internal: nets(&["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"]),
        }
    }
}

impl ZoneConfig {
    pub fn classify(&self, ip: &str) -> Zone {
        match ip.trim().parse::<Ipv4Addr>() {
            Ok(addr) => self.classify_addr(addr),
            Err(_) => Zone::Unknown,
        }
    }

    pub fn classify_addr(&self, ip: Ipv4Addr) -> Zone {
        if self.dmz.iter().any(|n| n.contains(&ip)) {
            Zone::Dmz
        } else if self.internal_index(ip).is_some() {
            Zone::Internal
        } else {
            Zone::External
        }
    }

    pub fn internal_index(&self, ip: Ipv4Addr) -> Option<usize> {
        self.internal.iter().position(|n| n.contains(&ip))
    }
}

const INTERFACE_HINTS: &[(&str, Zone)] = &[
    ("internal", Zone::Internal),
    ("inside", Zone::Internal),
    ("lan", Zone::Internal),
    ("dmz", Zone::Dmz),
    ("external", Zone::External),
    ("outside", Zone::External),
    ("wan", Zone::External),
];

const DEVICE_HINTS: &[(&str, Zone)] = &[
    ("internal", Zone::Internal),
    ("dmz", Zone::Dmz),
    ("external", Zone::External),
];

fn first_hint(text: &str, hints: &[(&str, Zone)]) -> Option<Zone> {
    let lower = text.to_ascii_lowercase();
    hints
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, zone)| *zone)
}

pub fn zone_from_interface(name: &str) -> Option<Zone> {
    first_hint(name, INTERFACE_HINTS)
}

pub fn zone_from_label(label: &str) -> Option<Zone> {
    first_hint(label, DEVICE_HINTS)
}
