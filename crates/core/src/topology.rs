use crate::{DeviceRepository, RouteTable, Zone, ZoneConfig, zone_from_interface, zone_from_label};
use object_model::Device;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use tracing::{debug, warn};

/// Upper bound on devices visited by one routing walk.
pub const DEFAULT_MAX_WALK: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HopRole {
    Endpoint,
    Source,
    Transit,
    Destination,
}

/// One device on the resolved path, before any policy is evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopPlan {
    pub device_id: String,
    pub role: HopRole,
    pub ingress_interface: String,
    pub egress_interface: String,
    pub ingress_zone: Zone,
    pub egress_zone: Zone,
    pub next_hop_ip: Option<Ipv4Addr>,
}

/// Works out which devices a packet crosses.
///
/// With route data the path follows longest-prefix matches from the device attached
/// to the source; without any route data it falls back to zone heuristics over
/// device names.
#[derive(Debug, Clone)]
pub struct TopologyResolver {
    zones: ZoneConfig,
    max_walk: usize,
}

impl Default for TopologyResolver {
    fn default() -> Self {
        TopologyResolver::new(ZoneConfig::default(), DEFAULT_MAX_WALK)
    }
}

impl TopologyResolver {
    pub fn new(zones: ZoneConfig, max_walk: usize) -> Self {
        TopologyResolver {
            zones,
            max_walk: max_walk.max(1),
        }
    }

    pub fn zones(&self) -> &ZoneConfig {
        &self.zones
    }

    /// `None` means no path can be determined and must be treated as a failure.
    pub fn resolve_path(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        repo: &DeviceRepository,
    ) -> Option<Vec<HopPlan>> {
        if repo.is_empty() {
            warn!("no devices loaded, cannot resolve topology");
            return None;
        }
        let src_zone = self.zones.classify_addr(src);
        let dst_zone = self.zones.classify_addr(dst);
        let sequence: Vec<(&Device, Option<Ipv4Addr>)> = if repo.has_routes() {
            self.routed_sequence(src, dst, repo)?
        } else {
            self.zone_sequence(src_zone, dst_zone, repo)
                .into_iter()
                .map(|d| (d, None))
                .collect()
        };
        if sequence.is_empty() {
            return None;
        }
        Some(self.plan(&sequence, src, dst, src_zone, dst_zone))
    }

    fn routed_sequence<'r>(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        repo: &'r DeviceRepository,
    ) -> Option<Vec<(&'r Device, Option<Ipv4Addr>)>> {
        let first = entry_device(src, repo)?;
        if attached_devices(dst, repo).iter().any(|last| last.id == first.id) {
            return Some(vec![(first, None)]);
        }

        let mut path = Vec::new();
        let mut current = first;
        for _ in 0..self.max_walk {
            let Some(route) = RouteTable::new(&current.routes).longest_match(dst) else {
                debug!(device = %current.id, %dst, "no route to destination");
                path.push((current, None));
                return Some(path);
            };
            let gateway = match route.next_hop() {
                Ok(Some(gw)) => gw,
                Ok(None) => {
                    path.push((current, None));
                    return Some(path);
                }
                Err(e) => {
                    warn!(device = %current.id, error = %e, "unusable gateway, ending walk");
                    path.push((current, None));
                    return Some(path);
                }
            };
            path.push((current, Some(gateway)));
            match gateway_owner(gateway, repo, &current.id) {
                Some(next) => current = next,
                None => {
                    debug!(device = %current.id, %gateway, "gateway outside loaded devices");
                    return Some(path);
                }
            }
        }
        warn!(max_walk = self.max_walk, "topology walk reached its hop cap, path is partial");
        Some(path)
    }

    fn zone_sequence<'r>(
        &self,
        src_zone: Zone,
        dst_zone: Zone,
        repo: &'r DeviceRepository,
    ) -> Vec<&'r Device> {
        let devices: Vec<&Device> = repo.devices().collect();
        let mut tagged: Vec<(Zone, &Device)> = devices
            .iter()
            .filter_map(|d| zone_from_label(&d.label()).map(|z| (z, *d)))
            .collect();
        if tagged.is_empty() {
            tagged = positional_zones(&devices);
        }

        // both addresses are already parsed, so neither zone is Unknown here
        let chain = if src_zone == dst_zone {
            vec![src_zone]
        } else {
            vec![src_zone, dst_zone]
        };
        let mut path: Vec<&Device> = Vec::new();
        for zone in chain {
            if let Some((_, device)) = tagged.iter().find(|(z, _)| *z == zone)
                && !path.iter().any(|p| p.id == device.id)
            {
                path.push(*device);
            }
        }
        if path.is_empty() {
            warn!(%src_zone, %dst_zone, "no device matches the zone pair, traversing every device");
            return devices;
        }
        path
    }

    fn plan(
        &self,
        sequence: &[(&Device, Option<Ipv4Addr>)],
        src: Ipv4Addr,
        dst: Ipv4Addr,
        src_zone: Zone,
        dst_zone: Zone,
    ) -> Vec<HopPlan> {
        let last = sequence.len() - 1;
        let mut current_src = src;
        let mut hops = Vec::with_capacity(sequence.len());
        for (index, (device, next_hop)) in sequence.iter().enumerate() {
            let table = RouteTable::new(&device.routes);
            let ingress_interface = self.interface_for(&table, current_src);
            let egress_interface = self.interface_for(&table, next_hop.unwrap_or(dst));
            let role = match index {
                _ if last == 0 => HopRole::Endpoint,
                0 => HopRole::Source,
                i if i == last => HopRole::Destination,
                _ => HopRole::Transit,
            };
            hops.push(HopPlan {
                device_id: device.id.clone(),
                role,
                ingress_zone: zone_from_interface(&ingress_interface).unwrap_or(src_zone),
                egress_zone: zone_from_interface(&egress_interface).unwrap_or(dst_zone),
                ingress_interface,
                egress_interface,
                next_hop_ip: *next_hop,
            });
            if let Some(gw) = next_hop {
                current_src = *gw;
            }
        }
        hops
    }

    fn interface_for(&self, table: &RouteTable<'_>, ip: Ipv4Addr) -> String {
        table
            .longest_match(ip)
            .map(|r| r.interface.as_str())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| infer_interface_for_ip(ip, &self.zones))
    }
}

pub fn infer_interface_for_ip(ip: Ipv4Addr, zones: &ZoneConfig) -> String {
    match zones.classify_addr(ip) {
        Zone::Dmz => "dmz".to_string(),
        Zone::Internal => format!("internal{}", zones.internal_index(ip).map_or(1, |i| i + 1)),
        Zone::External | Zone::Unknown => "wan1".to_string(),
    }
}

/// Device whose directly connected networks hold `gateway`, other than `exclude`.
///
/// Several devices on one shared segment resolve to the lowest id.
pub(crate) fn gateway_owner<'r>(
    gateway: Ipv4Addr,
    repo: &'r DeviceRepository,
    exclude: &str,
) -> Option<&'r Device> {
    top_scoring(repo.devices().filter(|d| d.id != exclude), |d| {
        RouteTable::new(&d.routes).connected_prefix(gateway)
    })
    .into_iter()
    .min_by(|a, b| a.id.cmp(&b.id))
}

fn attached_devices(ip: Ipv4Addr, repo: &DeviceRepository) -> Vec<&Device> {
    top_scoring(repo.devices(), |d| RouteTable::new(&d.routes).connected_prefix(ip))
}

// A device directly connected to `src` wins. Otherwise prefer the device whose best
// route towards `src` leaves through a gateway no loaded device owns, then the
// longer prefix. A remaining tie is ambiguous.
fn entry_device(src: Ipv4Addr, repo: &DeviceRepository) -> Option<&Device> {
    let attached = attached_devices(src, repo);
    let candidates = if attached.is_empty() {
        top_scoring(repo.devices(), |d| {
            let route = RouteTable::new(&d.routes).longest_match(src)?;
            let prefix = route.network().ok()?.prefix_len();
            let upstream = match route.next_hop() {
                Ok(Some(gw)) => gateway_owner(gw, repo, &d.id).is_none(),
                _ => false,
            };
            Some((upstream, prefix))
        })
    } else {
        attached
    };
    match candidates.as_slice() {
        [] => {
            warn!(%src, "no device has a route covering the source");
            None
        }
        [one] => Some(*one),
        tied => {
            let ids: Vec<&str> = tied.iter().map(|d| d.id.as_str()).collect();
            warn!(%src, devices = ?ids, "entry device is ambiguous");
            None
        }
    }
}

fn top_scoring<'r, S: Ord + Copy>(
    devices: impl Iterator<Item = &'r Device>,
    score: impl Fn(&Device) -> Option<S>,
) -> Vec<&'r Device> {
    let mut best: Option<S> = None;
    let mut picked = Vec::new();
    for device in devices {
        let Some(s) = score(device) else { continue };
        match best {
            Some(current) if s < current => {}
            Some(current) if s == current => picked.push(device),
            _ => {
                best = Some(s);
                picked.clear();
                picked.push(device);
            }
        }
    }
    picked
}

fn positional_zones<'r>(devices: &[&'r Device]) -> Vec<(Zone, &'r Device)> {
    let last = devices.len().saturating_sub(1);
    devices
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let zone = match i {
                0 => Zone::Internal,
                i if i == last => Zone::External,
                _ => Zone::Dmz,
            };
            (zone, *d)
        })
        .collect()
}
