use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};

use crate::config_error;
use crate::error::Result;

/// Identity of a cluster node: its IPv4 address and port.
///
/// Used as the membership table key and as the transport destination.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, PartialOrd, Ord, Eq, Hash,
)]
pub struct NodeIdentity {
    ip: u32,
    port: u16,
}

impl NodeIdentity {
    /// Well-known introducer of the origin deployment (`ip=1, port=0`).
    pub const ORIGIN_INTRODUCER: NodeIdentity = NodeIdentity { ip: 1, port: 0 };

    pub const fn new(ip: u32, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn ip(&self) -> u32 {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(self.ip), self.port))
    }
}

impl From<SocketAddrV4> for NodeIdentity {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(u32::from(*addr.ip()), addr.port())
    }
}

impl TryFrom<SocketAddr> for NodeIdentity {
    type Error = crate::error::StarlingError;

    fn try_from(addr: SocketAddr) -> Result<Self> {
        match addr {
            SocketAddr::V4(v4) => Ok(v4.into()),
            SocketAddr::V6(v6) => Err(config_error!(
                "node identities are IPv4 only, got {}",
                v6
            )),
        }
    }
}

impl std::str::FromStr for NodeIdentity {
    type Err = crate::error::StarlingError;

    fn from_str(s: &str) -> Result<Self> {
        let addr: SocketAddr = s.trim().parse()?;
        addr.try_into()
    }
}

impl std::fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", Ipv4Addr::from(self.ip), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_dotted_quad() {
        let id = NodeIdentity::new(u32::from(Ipv4Addr::new(10, 0, 0, 7)), 7946);
        assert_eq!(id.to_string(), "10.0.0.7:7946");
        assert_eq!(NodeIdentity::ORIGIN_INTRODUCER.to_string(), "0.0.0.1:0");
    }

    #[test]
    fn test_parse_and_socket_addr_agree() {
        let id: NodeIdentity = "127.0.0.1:8412".parse().unwrap();
        assert_eq!(id.port(), 8412);
        assert_eq!(id.socket_addr(), "127.0.0.1:8412".parse().unwrap());
        assert_eq!(NodeIdentity::try_from(id.socket_addr()).unwrap(), id);
    }

    #[test]
    fn test_ipv6_rejected() {
        assert!("[::1]:8412".parse::<NodeIdentity>().is_err());
        assert!("not an address".parse::<NodeIdentity>().is_err());
    }
}
