use object_model::{
    AddressKind, Device, Group, Ipv4Network, Policy, is_any_address, is_any_service,
    parse_network,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// An earlier policy with a different action catches all of this policy's traffic.
    Shadowed,
    /// An earlier policy with the same action already covers this one.
    Redundant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyConflict {
    pub device_id: String,
    pub policy_id: u32,
    pub covered_by: u32,
    pub kind: ConflictKind,
}

#[derive(Debug)]
enum Coverage<'a> {
    Any,
    Names(BTreeSet<&'a str>),
}

struct Expanded<'a> {
    policy: &'a Policy,
    src: Coverage<'a>,
    dst: Coverage<'a>,
    svc: Coverage<'a>,
}

/// Policies that can never be hit because a lower-id enabled policy covers them.
pub fn policy_conflicts(device: &Device) -> Vec<PolicyConflict> {
    let mut enabled: Vec<&Policy> = device
        .policies
        .iter()
        .filter(|p| p.enabled)
        .filter(|p| {
            !p.source_addresses.is_empty()
                && !p.destination_addresses.is_empty()
                && !p.services.is_empty()
        })
        .collect();
    enabled.sort_by_key(|p| p.id);

    let expanded: Vec<Expanded<'_>> = enabled
        .into_iter()
        .map(|policy| Expanded {
            policy,
            src: expand(&policy.source_addresses, is_any_address, |n| device.address_group(n)),
            dst: expand(&policy.destination_addresses, is_any_address, |n| {
                device.address_group(n)
            }),
            svc: expand(&policy.services, is_any_service, |n| device.service_group(n)),
        })
        .collect();

    let mut conflicts = Vec::new();
    for (i, later) in expanded.iter().enumerate() {
        let Some(earlier) = expanded[..i].iter().find(|e| covers(device, e, later)) else {
            continue;
        };
        let kind = if earlier.policy.action == later.policy.action {
            ConflictKind::Redundant
        } else {
            ConflictKind::Shadowed
        };
        debug!(device = %device.id, policy = later.policy.id, covered_by = earlier.policy.id, ?kind, "policy conflict");
        conflicts.push(PolicyConflict {
            device_id: device.id.clone(),
            policy_id: later.policy.id,
            covered_by: earlier.policy.id,
            kind,
        });
    }
    conflicts
}

fn covers(device: &Device, outer: &Expanded<'_>, inner: &Expanded<'_>) -> bool {
    addresses_cover(device, &outer.src, &inner.src)
        && addresses_cover(device, &outer.dst, &inner.dst)
        && names_cover(&outer.svc, &inner.svc)
}

fn names_cover(outer: &Coverage<'_>, inner: &Coverage<'_>) -> bool {
    match (outer, inner) {
        (Coverage::Any, _) => true,
        (Coverage::Names(_), Coverage::Any) => false,
        (Coverage::Names(o), Coverage::Names(i)) => i.is_subset(o),
    }
}

/// Like `names_cover`, but an ipmask leaf is also covered by a wider ipmask leaf.
fn addresses_cover(device: &Device, outer: &Coverage<'_>, inner: &Coverage<'_>) -> bool {
    let (Coverage::Names(o), Coverage::Names(i)) = (outer, inner) else {
        return names_cover(outer, inner);
    };
    let wide: Vec<Ipv4Network> = o.iter().filter_map(|n| ipmask(device, n)).collect();
    i.iter().all(|leaf| {
        o.contains(leaf)
            || ipmask(device, leaf).is_some_and(|net| wide.iter().any(|w| w.covers(&net)))
    })
}

fn ipmask(device: &Device, name: &str) -> Option<Ipv4Network> {
    match &device.address(name)?.kind {
        AddressKind::Ipmask { subnet } => parse_network(subnet).ok(),
        _ => None,
    }
}

/// Flattens references through groups. Revisited groups are skipped.
fn expand<'a>(
    refs: &'a [String],
    is_any: fn(&str) -> bool,
    group: impl Fn(&str) -> Option<&'a Group>,
) -> Coverage<'a> {
    let mut leaves = BTreeSet::new();
    let mut visited = HashSet::new();
    let mut pending: Vec<&'a str> = refs.iter().map(String::as_str).collect();
    while let Some(name) = pending.pop() {
        if is_any(name) {
            return Coverage::Any;
        }
        if !visited.insert(name) {
            continue;
        }
        match group(name) {
            Some(g) => pending.extend(g.members.iter().map(String::as_str)),
            None => {
                leaves.insert(name);
            }
        }
    }
    Coverage::Names(leaves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_model::{AddressObject, PolicyAction, ServiceObject};

    fn device() -> Device {
        let mut d = Device::new("fw1");
        d.addresses = vec![
            AddressObject::ipmask("lan", "192.168.0.0 255.255.0.0"),
            AddressObject::ipmask("lan-users", "192.168.10.0/24"),
            AddressObject::ipmask("web", "172.16.10.5/32"),
        ];
        d.address_groups = vec![Group::new("inside", &["lan", "loop"]), Group::new("loop", &["inside"])];
        d.services = vec![ServiceObject::tcp("HTTPS", "443"), ServiceObject::tcp("SSH", "22")];
        d.service_groups = vec![Group::new("admin", &["SSH", "HTTPS"])];
        d
    }

    #[test]
    fn wildcard_policy_shadows_later_deny() {
        let mut d = device();
        d.policies = vec![
            Policy::new(20, PolicyAction::Deny)
                .with_sources(&["lan-users"])
                .with_services(&["SSH"]),
            Policy::new(10, PolicyAction::Allow),
        ];
        let found = policy_conflicts(&d);
        assert_eq!(
            found,
            vec![PolicyConflict {
                device_id: "fw1".to_string(),
                policy_id: 20,
                covered_by: 10,
                kind: ConflictKind::Shadowed,
            }]
        );
    }

    #[test]
    fn wider_subnet_and_group_make_redundant() {
        let mut d = device();
        d.policies = vec![
            Policy::new(1, PolicyAction::Allow)
                .with_sources(&["inside"])
                .with_destinations(&["web"])
                .with_services(&["admin"]),
            Policy::new(2, PolicyAction::Allow)
                .with_sources(&["lan-users"])
                .with_destinations(&["web"])
                .with_services(&["HTTPS"]),
        ];
        let found = policy_conflicts(&d);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].policy_id, 2);
        assert_eq!(found[0].kind, ConflictKind::Redundant);
    }

    #[test]
    fn narrower_earlier_policy_does_not_cover() {
        let mut d = device();
        d.policies = vec![
            Policy::new(1, PolicyAction::Deny)
                .with_sources(&["lan-users"])
                .with_services(&["SSH"]),
            Policy::new(2, PolicyAction::Allow).with_sources(&["lan"]),
        ];
        assert!(policy_conflicts(&d).is_empty());
    }

    #[test]
    fn disabled_policies_are_ignored() {
        let mut d = device();
        d.policies = vec![
            Policy::new(1, PolicyAction::Allow).disabled(),
            Policy::new(2, PolicyAction::Deny),
        ];
        assert!(policy_conflicts(&d).is_empty());
    }

    #[test]
    fn group_cycle_terminates() {
        let d = device();
        let refs = vec!["inside".to_string()];
        match expand(&refs, is_any_address, |n| d.address_group(n)) {
            Coverage::Names(leaves) => assert_eq!(leaves.into_iter().collect::<Vec<_>>(), vec!["lan"]),
            Coverage::Any => panic!("cycle must not expand to any"),
        }
    }
}
