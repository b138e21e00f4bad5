//! Tunnel encapsulation attributes carried by VIFs and plain interfaces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::IpProto;

/// IANA-assigned VxLAN destination UDP port.
pub const VXLAN_DEFAULT_PORT: u16 = 4789;

/// Encapsulation method of an L2 tunnel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncapsMethod {
    #[default]
    None,
    Gre,
    Vxlan,
}

impl fmt::Display for EncapsMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EncapsMethod::None => "none",
            EncapsMethod::Gre => "gre",
            EncapsMethod::Vxlan => "vxlan",
        };
        f.write_str(s)
    }
}

/// Protection applied to tunnel traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityMode {
    #[default]
    None,
    IpSec,
}

/// Tunnel attributes of a VIF or plain interface.
///
/// Activation requires at least one remote address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    local: IpAddr,
    remotes: Vec<IpAddr>,
    security: SecurityMode,
    encaps: EncapsMethod,
    vxlan_port: u16,
    vni: u32,
    ip_proto: IpProto,
}

impl TunnelConfig {
    pub fn new(local: IpAddr) -> Self {
        TunnelConfig {
            local,
            remotes: Vec::new(),
            security: SecurityMode::None,
            encaps: EncapsMethod::None,
            vxlan_port: VXLAN_DEFAULT_PORT,
            vni: 0,
            ip_proto: IpProto::IPIP,
        }
    }

    pub fn with_remotes(mut self, remotes: Vec<IpAddr>) -> Self {
        self.remotes = remotes;
        self
    }

    pub fn with_security(mut self, security: SecurityMode) -> Self {
        self.security = security;
        self
    }

    pub fn with_encaps(mut self, encaps: EncapsMethod) -> Self {
        self.encaps = encaps;
        self
    }

    pub fn with_vxlan(mut self, port: u16, vni: u32) -> Self {
        self.encaps = EncapsMethod::Vxlan;
        self.vxlan_port = port;
        self.vni = vni;
        self
    }

    pub fn with_ip_proto(mut self, proto: IpProto) -> Self {
        self.ip_proto = proto;
        self
    }

    pub const fn local_address(&self) -> IpAddr {
        self.local
    }

    pub fn remote_addresses(&self) -> &[IpAddr] {
        &self.remotes
    }

    pub const fn security(&self) -> SecurityMode {
        self.security
    }

    pub const fn encaps_method(&self) -> EncapsMethod {
        self.encaps
    }

    pub const fn vxlan_port(&self) -> u16 {
        self.vxlan_port
    }

    pub const fn vni(&self) -> u32 {
        self.vni
    }

    pub const fn ip_proto(&self) -> IpProto {
        self.ip_proto
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_defaults() {
        let t = TunnelConfig::new(addr("203.0.113.1"));
        assert_eq!(t.local_address(), addr("203.0.113.1"));
        assert!(t.remote_addresses().is_empty());
        assert_eq!(t.security(), SecurityMode::None);
        assert_eq!(t.encaps_method(), EncapsMethod::None);
        assert_eq!(t.vxlan_port(), VXLAN_DEFAULT_PORT);
        assert_eq!(t.ip_proto(), IpProto::IPIP);
    }

    #[test]
    fn test_builders() {
        let t = TunnelConfig::new(addr("203.0.113.1"))
            .with_remotes(vec![addr("198.51.100.1"), addr("198.51.100.2")])
            .with_security(SecurityMode::IpSec)
            .with_ip_proto(IpProto::ESP);
        assert_eq!(t.remote_addresses().len(), 2);
        assert_eq!(t.security(), SecurityMode::IpSec);
        assert_eq!(t.ip_proto(), IpProto::ESP);
    }

    #[test]
    fn test_vxlan_parameters() {
        let t = TunnelConfig::new(addr("203.0.113.1")).with_vxlan(14789, 5000);
        assert_eq!(t.encaps_method(), EncapsMethod::Vxlan);
        assert_eq!(t.vxlan_port(), 14789);
        assert_eq!(t.vni(), 5000);
    }

    #[test]
    fn test_encaps_display() {
        assert_eq!(EncapsMethod::Gre.to_string(), "gre");
        assert_eq!(EncapsMethod::Vxlan.to_string(), "vxlan");
        assert_eq!(EncapsMethod::None.to_string(), "none");
    }
}
