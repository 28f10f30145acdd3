#![forbid(unsafe_code)]

mod model;
mod net;
mod ports;
mod raw;

pub use model::*;
pub use net::*;
pub use ports::*;
pub use raw::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors raised while parsing configuration text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid {what}: {input:?}")]
    Invalid { what: &'static str, input: String },
    #[error("unsupported {what}: {input:?}")]
    Unsupported { what: &'static str, input: String },
}

impl ParseError {
    pub(crate) fn invalid(what: &'static str, input: &str) -> Self {
        ParseError::Invalid {
            what,
            input: input.to_string(),
        }
    }
}

/// Transport protocol of a simulated packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        }
    }
}

impl FromStr for Protocol {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" | "6" => Ok(Protocol::Tcp),
            "udp" | "17" => Ok(Protocol::Udp),
            "icmp" | "1" => Ok(Protocol::Icmp),
            _ => Err(ParseError::Unsupported {
                what: "protocol",
                input: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parses_names_and_numbers() {
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("17".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert_eq!(" icmp ".parse::<Protocol>().unwrap(), Protocol::Icmp);
        assert!("sctp".parse::<Protocol>().is_err());
    }
}
