use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network. Host bits of the base address are cleared on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Network {
    addr: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Network {
    pub const ANY: Ipv4Network = Ipv4Network {
        addr: Ipv4Addr::UNSPECIFIED,
        prefix: 0,
    };

    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, ParseError> {
        if prefix > 32 {
            return Err(ParseError::invalid("prefix", &prefix.to_string()));
        }
        let base = u32::from(addr) & mask_v4(prefix);
        Ok(Ipv4Network {
            addr: Ipv4Addr::from(base),
            prefix,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, ip: &Ipv4Addr) -> bool {
        let mask = mask_v4(self.prefix);
        (u32::from(*ip) & mask) == u32::from(self.addr)
    }

    /// True when every address of `other` is inside `self`.
    pub fn covers(&self, other: &Ipv4Network) -> bool {
        self.prefix <= other.prefix && self.contains(&other.addr)
    }
}

impl fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for Ipv4Network {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_network(s)
    }
}

impl TryFrom<String> for Ipv4Network {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_network(&value)
    }
}

impl From<Ipv4Network> for String {
    fn from(value: Ipv4Network) -> Self {
        value.to_string()
    }
}

/// Parses `"10.0.0.0/8"`, `"10.0.0.0 255.0.0.0"`, `"10.0.0.0/255.0.0.0"` or a bare
/// address (treated as `/32`).
pub fn parse_network(input: &str) -> Result<Ipv4Network, ParseError> {
    let trimmed = input.trim();
    let mut tokens = trimmed.split_whitespace();
    let (base, mask) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(base), Some(mask), None) => (base, Some(mask)),
        (Some(single), None, None) => match single.split_once('/') {
            Some((base, mask)) => (base, Some(mask)),
            None => (single, None),
        },
        _ => return Err(ParseError::invalid("network", input)),
    };
    let addr: Ipv4Addr = base
        .parse()
        .map_err(|_| ParseError::invalid("ipv4 address", input))?;
    let prefix = match mask {
        None => 32,
        Some(mask) if mask.contains('.') => {
            let mask: Ipv4Addr = mask
                .parse()
                .map_err(|_| ParseError::invalid("netmask", input))?;
            mask_to_prefix(mask)
        }
        Some(prefix) => prefix
            .parse::<u8>()
            .map_err(|_| ParseError::invalid("prefix", input))?,
    };
    Ipv4Network::new(addr, prefix)
}

/// Prefix length of a dotted netmask, counted as the set bits of its octets.
pub fn mask_to_prefix(mask: Ipv4Addr) -> u8 {
    mask.octets().iter().map(|o| o.count_ones() as u8).sum()
}

fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn dotted_mask_and_cidr_are_equivalent() {
        let dotted = parse_network("192.168.1.0 255.255.255.0").unwrap();
        let cidr = parse_network("192.168.1.0/24").unwrap();
        let slash_mask = parse_network("192.168.1.0/255.255.255.0").unwrap();
        assert_eq!(dotted, cidr);
        assert_eq!(slash_mask, cidr);
        assert!(dotted.contains(&ip("192.168.1.77")));
        assert!(!dotted.contains(&ip("192.168.2.1")));
    }

    #[test]
    fn bare_address_is_host_route() {
        let host = parse_network("10.1.2.3").unwrap();
        assert_eq!(host.prefix_len(), 32);
        assert!(host.contains(&ip("10.1.2.3")));
        assert!(!host.contains(&ip("10.1.2.4")));
    }

    #[test]
    fn host_bits_are_cleared() {
        let net = parse_network("10.1.2.3/8").unwrap();
        assert_eq!(net.network(), ip("10.0.0.0"));
        assert_eq!(net.to_string(), "10.0.0.0/8");
    }

    #[test]
    fn zero_prefix_matches_everything() {
        let any = parse_network("0.0.0.0 0.0.0.0").unwrap();
        assert_eq!(any, Ipv4Network::ANY);
        assert!(any.contains(&ip("255.255.255.255")));
        assert!(any.contains(&ip("0.0.0.0")));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_network("").is_err());
        assert!(parse_network("10.0.0.0/33").is_err());
        assert!(parse_network("10.0.0.0 255.0.0.0 extra").is_err());
        assert!(parse_network("host.example.com").is_err());
        assert!(parse_network("10.0.0.0 255.0.0").is_err());
    }

    #[test]
    fn covers_respects_prefix_lengths() {
        let wide = parse_network("10.0.0.0/8").unwrap();
        let narrow = parse_network("10.20.0.0/16").unwrap();
        assert!(wide.covers(&narrow));
        assert!(!narrow.covers(&wide));
    }

    #[test]
    fn serde_uses_cidr_strings() {
        let net: Ipv4Network = serde_json::from_str("\"172.16.0.0 255.240.0.0\"").unwrap();
        assert_eq!(serde_json::to_string(&net).unwrap(), "\"172.16.0.0/12\"");
    }
}
