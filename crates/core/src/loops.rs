use crate::{DeviceRepository, RouteTable, topology::gateway_owner};
use object_model::{Device, Ipv4Network};
use serde::Serialize;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingLoop {
    pub destination: Ipv4Network,
    /// Devices in forwarding order, starting from the lowest id.
    pub devices: Vec<String>,
}

/// Follows every gateway route across loaded devices and reports forwarding cycles.
pub fn routing_loops(repo: &DeviceRepository) -> Vec<RoutingLoop> {
    let mut found = Vec::new();
    let mut seen: HashSet<(Ipv4Network, Vec<String>)> = HashSet::new();
    for device in repo.devices() {
        for route in &device.routes {
            if !matches!(route.next_hop(), Ok(Some(_))) {
                continue;
            }
            let Ok(destination) = route.network() else {
                continue;
            };
            let Some(mut cycle) = follow(device, destination.network(), repo) else {
                continue;
            };
            if let Some(start) = cycle
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.cmp(b.1))
                .map(|(i, _)| i)
            {
                cycle.rotate_left(start);
            }
            if seen.insert((destination, cycle.clone())) {
                warn!(%destination, devices = ?cycle, "routing loop");
                found.push(RoutingLoop {
                    destination,
                    devices: cycle,
                });
            }
        }
    }
    found
}

fn follow(start: &Device, target: Ipv4Addr, repo: &DeviceRepository) -> Option<Vec<String>> {
    let mut visited: Vec<&str> = Vec::new();
    let mut current = start;
    loop {
        if let Some(pos) = visited.iter().position(|id| *id == current.id) {
            return Some(visited[pos..].iter().map(|id| id.to_string()).collect());
        }
        visited.push(&current.id);
        let route = RouteTable::new(&current.routes).longest_match(target)?;
        let gateway = route.next_hop().ok()??;
        current = gateway_owner(gateway, repo, &current.id)?;
    }
}
