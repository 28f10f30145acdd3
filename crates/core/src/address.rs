use object_model::{AddressKind, AddressObject, Device, ParseError, is_any_address, parse_network};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tracing::{error, trace, warn};

/// Decides whether an IP falls inside a named address object or group of one device.
///
/// Never fails: malformed objects and unknown names resolve to `false`.
#[derive(Debug, Clone, Copy)]
pub struct AddressResolver<'a> {
    device: &'a Device,
}

impl<'a> AddressResolver<'a> {
    pub fn new(device: &'a Device) -> Self {
        AddressResolver { device }
    }

    pub fn resolves(&self, ip: Ipv4Addr, name: &str) -> bool {
        let mut visited = HashSet::new();
        self.resolve_name(ip, name, &mut visited)
    }

    fn resolve_name(&self, ip: Ipv4Addr, name: &str, visited: &mut HashSet<&'a str>) -> bool {
        if is_any_address(name) {
            return true;
        }
        if let Some(group) = self.device.address_group(name) {
            if !visited.insert(group.name.as_str()) {
                trace!(device = %self.device.id, group = name, "address group revisited");
                return false;
            }
            return group
                .members
                .iter()
                .any(|member| self.resolve_name(ip, member, visited));
        }
        match self.device.address(name) {
            Some(obj) => match matches_object(ip, obj) {
                Ok(hit) => hit,
                Err(e) => {
                    error!(device = %self.device.id, address = name, error = %e, "address object evaluation failed");
                    false
                }
            },
            None => {
                trace!(device = %self.device.id, address = name, "unresolved address reference");
                false
            }
        }
    }
}

/// Tests one address object. FQDN objects never match an IP.
pub fn matches_object(ip: Ipv4Addr, obj: &AddressObject) -> Result<bool, ParseError> {
    match &obj.kind {
        AddressKind::Ipmask { subnet } => Ok(parse_network(subnet)?.contains(&ip)),
        AddressKind::Iprange { start_ip, end_ip } => {
            let bound = |value: &Option<String>, default: Ipv4Addr| -> Result<u32, ParseError> {
                match value {
                    Some(v) => v.trim().parse::<Ipv4Addr>().map(u32::from).map_err(|_| {
                        ParseError::Invalid {
                            what: "range bound",
                            input: v.clone(),
                        }
                    }),
                    None => Ok(u32::from(default)),
                }
            };
            let start = bound(start_ip, Ipv4Addr::UNSPECIFIED)?;
            let end = bound(end_ip, Ipv4Addr::BROADCAST)?;
            let ip = u32::from(ip);
            Ok(start <= ip && ip <= end)
        }
        AddressKind::Fqdn { .. } | AddressKind::WildcardFqdn { .. } => Ok(false),
        AddressKind::Unknown { type_name } => {
            warn!(address = %obj.name, kind = %type_name, "unsupported address type");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_model::{AddressObject, Group};

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn device() -> Device {
        let mut dev = Device::new("fw1");
        dev.addresses = vec![
            AddressObject::ipmask("lan", "192.168.1.0 255.255.255.0"),
            AddressObject::ipmask("lan-cidr", "192.168.1.0/24"),
            AddressObject::iprange("pool", "10.0.0.10", "10.0.0.20"),
            AddressObject::fqdn("cdn", "cdn.example.com"),
            AddressObject {
                name: "geo".into(),
                kind: AddressKind::Unknown {
                    type_name: "geography".into(),
                },
            },
            AddressObject::ipmask("broken", "192.168.1.0 255.255"),
        ];
        dev.address_groups = vec![
            Group::new("outer", &["inner"]),
            Group::new("inner", &["lan"]),
            Group::new("loop-a", &["loop-b"]),
            Group::new("loop-b", &["loop-a", "pool"]),
            Group::new("with-missing", &["ghost", "lan"]),
        ];
        dev
    }

    #[test]
    fn all_matches_everything() {
        let dev = device();
        let r = AddressResolver::new(&dev);
        for addr in ["0.0.0.0", "255.255.255.255", "8.8.8.8"] {
            assert!(r.resolves(ip(addr), "all"));
        }
    }

    #[test]
    fn dotted_and_cidr_subnets_agree() {
        let dev = device();
        let r = AddressResolver::new(&dev);
        for addr in ["192.168.1.1", "192.168.1.254", "192.168.2.1"] {
            assert_eq!(r.resolves(ip(addr), "lan"), r.resolves(ip(addr), "lan-cidr"));
        }
        assert!(r.resolves(ip("192.168.1.1"), "lan"));
    }

    #[test]
    fn nested_groups_resolve() {
        let dev = device();
        let r = AddressResolver::new(&dev);
        assert!(r.resolves(ip("192.168.1.7"), "outer"));
        assert!(!r.resolves(ip("192.168.9.7"), "outer"));
    }

    #[test]
    fn removing_leaf_match_breaks_group() {
        let mut dev = device();
        dev.addresses[0] = AddressObject::ipmask("lan", "172.31.0.0/16");
        let r = AddressResolver::new(&dev);
        assert!(!r.resolves(ip("192.168.1.7"), "outer"));
    }

    #[test]
    fn cyclic_groups_do_not_recurse_forever() {
        let dev = device();
        let r = AddressResolver::new(&dev);
        assert!(r.resolves(ip("10.0.0.15"), "loop-a"));
        assert!(!r.resolves(ip("10.0.0.99"), "loop-a"));
    }

    #[test]
    fn ranges_are_inclusive() {
        let dev = device();
        let r = AddressResolver::new(&dev);
        assert!(r.resolves(ip("10.0.0.10"), "pool"));
        assert!(r.resolves(ip("10.0.0.20"), "pool"));
        assert!(!r.resolves(ip("10.0.0.21"), "pool"));
    }

    #[test]
    fn open_range_bounds_default_to_full_space() {
        let obj = AddressObject {
            name: "open".into(),
            kind: AddressKind::Iprange {
                start_ip: None,
                end_ip: Some("10.0.0.1".into()),
            },
        };
        assert!(matches_object(ip("0.0.0.0"), &obj).unwrap());
        assert!(!matches_object(ip("10.0.0.2"), &obj).unwrap());
    }

    #[test]
    fn non_ip_kinds_and_bad_data_never_match() {
        let dev = device();
        let r = AddressResolver::new(&dev);
        assert!(!r.resolves(ip("1.2.3.4"), "cdn"));
        assert!(!r.resolves(ip("1.2.3.4"), "geo"));
        assert!(!r.resolves(ip("192.168.1.1"), "broken"));
        assert!(!r.resolves(ip("192.168.1.1"), "nope"));
    }

    #[test]
    fn unresolved_member_does_not_hide_others() {
        let dev = device();
        let r = AddressResolver::new(&dev);
        assert!(r.resolves(ip("192.168.1.3"), "with-missing"));
    }
}
