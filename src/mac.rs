//! hardware address module
//! This module provides the Ethernet MAC address type shared by the arbiter and the agent.

// core
use core::fmt;
use core::str::FromStr;

// constants
use crate::constants::ETHER_ADDR_LEN;

/// Ethernet MAC Address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(pub [u8; ETHER_ADDR_LEN]);

// MacAddr Type Implementation
impl MacAddr {
    // new() method
    pub const fn new(octets: [u8; ETHER_ADDR_LEN]) -> MacAddr {
        MacAddr(octets)
    }
    // octets() getter
    pub fn octets(&self) -> [u8; ETHER_ADDR_LEN] {
        self.0
    }
    // from_slice() method
    // read an address from the first six bytes of a link-layer address field
    pub fn from_slice(bytes: &[u8]) -> Option<MacAddr> {
        if bytes.len() < ETHER_ADDR_LEN {
            return None;
        }
        let mut octets = [0u8; ETHER_ADDR_LEN];
        octets.copy_from_slice(&bytes[..ETHER_ADDR_LEN]);
        Some(MacAddr(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// MAC Address Parsing Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacParseError {
    Empty,
    OctetCount(usize),
    BadOctet(usize),
    NotAscii,
}

impl fmt::Display for MacParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MacParseError::Empty => write!(f, "empty MAC address"),
            MacParseError::OctetCount(n) => {
                write!(f, "expected {} octets in MAC address, got {}", ETHER_ADDR_LEN, n)
            }
            MacParseError::BadOctet(i) => write!(f, "invalid hex octet #{} in MAC address", i + 1),
            MacParseError::NotAscii => write!(f, "MAC address is not ASCII text"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MacParseError {}

impl FromStr for MacAddr {
    type Err = MacParseError;

    // parse 'xx:xx:xx:xx:xx:xx', one or two hex digits per octet, any case
    fn from_str(s: &str) -> Result<MacAddr, MacParseError> {
        if s.is_empty() {
            return Err(MacParseError::Empty);
        }
        let count = s.split(':').count();
        if count != ETHER_ADDR_LEN {
            return Err(MacParseError::OctetCount(count));
        }
        let mut octets = [0u8; ETHER_ADDR_LEN];
        for (i, part) in s.split(':').enumerate() {
            // from_str_radix() would also accept a leading '+'
            if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(MacParseError::BadOctet(i));
            }
            octets[i] = u8::from_str_radix(part, 16).map_err(|_| MacParseError::BadOctet(i))?;
        }
        Ok(MacAddr(octets))
    }
}

// parse_server_identity() function
/// Decode the content of the arbiter identity file (`server.mac`)
///
/// The file holds the arbiter's MAC address as ASCII text; surrounding
/// whitespace, including a trailing newline, is ignored.
pub fn parse_server_identity(content: &[u8]) -> Result<MacAddr, MacParseError> {
    let text = core::str::from_utf8(content).map_err(|_| MacParseError::NotAscii)?;
    if !text.is_ascii() {
        return Err(MacParseError::NotAscii);
    }
    text.trim().parse::<MacAddr>()
}
