use crate::{AddressResolver, ServiceResolver};
use object_model::{Device, Policy, Protocol};
use std::net::Ipv4Addr;

/// First-match policy lookup on one device.
///
/// Among enabled policies whose source, destination and service all match, the one
/// with the lowest id wins regardless of its position in the stored list.
#[derive(Debug, Clone, Copy)]
pub struct PolicyMatcher<'a> {
    device: &'a Device,
    addresses: AddressResolver<'a>,
    services: ServiceResolver<'a>,
}

impl<'a> PolicyMatcher<'a> {
    pub fn new(device: &'a Device) -> Self {
        PolicyMatcher {
            device,
            addresses: AddressResolver::new(device),
            services: ServiceResolver::new(device),
        }
    }

    pub fn match_policy(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        port: u16,
        protocol: Protocol,
    ) -> Option<&'a Policy> {
        self.device
            .policies
            .iter()
            .filter(|p| p.enabled)
            .filter(|p| self.matches(p, src, dst, port, protocol))
            .min_by_key(|p| p.id)
    }

    pub fn matches(
        &self,
        policy: &Policy,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        port: u16,
        protocol: Protocol,
    ) -> bool {
        policy
            .source_addresses
            .iter()
            .any(|name| self.addresses.resolves(src, name))
            && policy
                .destination_addresses
                .iter()
                .any(|name| self.addresses.resolves(dst, name))
            && policy
                .services
                .iter()
                .any(|name| self.services.resolves(port, protocol, name))
    }
}
