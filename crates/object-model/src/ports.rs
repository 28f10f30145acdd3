use crate::ParseError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        let (start, end) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };
        PortRange { start, end }
    }

    pub fn single(port: u16) -> Self {
        PortRange {
            start: port,
            end: port,
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }
}

/// Parses a FortiOS port-range field such as `"80 443 8000-8080"`.
///
/// A token may carry a source-port part after `:` (`"80:1024-65535"`); only the
/// destination part is kept.
pub fn parse_port_ranges(input: &str) -> Result<Vec<PortRange>, ParseError> {
    input
        .split_whitespace()
        .map(|token| {
            let dst = token.split(':').next().unwrap_or(token);
            let parse = |s: &str| {
                s.trim()
                    .parse::<u16>()
                    .map_err(|_| ParseError::invalid("port", token))
            };
            match dst.split_once('-') {
                Some((start, end)) => Ok(PortRange::new(parse(start)?, parse(end)?)),
                None => Ok(PortRange::single(parse(dst)?)),
            }
        })
        .collect()
}
