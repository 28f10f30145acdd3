use object_model::RouteEntry;
use std::net::Ipv4Addr;
use tracing::debug;

/// Longest-prefix-match view over one device's static routes.
///
/// Entries whose destination does not parse are skipped. On equal prefix length the
/// entry listed first wins.
#[derive(Debug, Clone, Copy)]
pub struct RouteTable<'a> {
    routes: &'a [RouteEntry],
}

impl<'a> RouteTable<'a> {
    pub fn new(routes: &'a [RouteEntry]) -> Self {
        RouteTable { routes }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn longest_match(&self, ip: Ipv4Addr) -> Option<&'a RouteEntry> {
        self.best(ip, |_| true)
    }

    pub fn connected_match(&self, ip: Ipv4Addr) -> Option<&'a RouteEntry> {
        self.best(ip, RouteEntry::is_connected)
    }

    pub(crate) fn connected_prefix(&self, ip: Ipv4Addr) -> Option<u8> {
        self.connected_match(ip)
            .and_then(|r| r.network().ok())
            .map(|n| n.prefix_len())
    }

    fn best(&self, ip: Ipv4Addr, keep: impl Fn(&RouteEntry) -> bool) -> Option<&'a RouteEntry> {
        let mut best: Option<(&'a RouteEntry, u8)> = None;
        for route in self.routes.iter().filter(|r| keep(r)) {
            let network = match route.network() {
                Ok(n) => n,
                Err(e) => {
                    debug!(destination = %route.destination, error = %e, "skipping unparsable route");
                    continue;
                }
            };
            if !network.contains(&ip) {
                continue;
            }
            let prefix = network.prefix_len();
            if best.is_none_or(|(_, current)| prefix > current) {
                best = Some((route, prefix));
            }
        }
        best.map(|(route, _)| route)
    }
}
