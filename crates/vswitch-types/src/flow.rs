//! Packet-classification keys consumed by the forwarding graph.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::VifIndex;

/// An IP protocol number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IpProto(u8);

impl IpProto {
    pub const IPIP: Self = IpProto(4);
    pub const UDP: Self = IpProto(17);
    pub const GRE: Self = IpProto(47);
    pub const ESP: Self = IpProto(50);

    pub const fn new(raw: u8) -> Self {
        IpProto(raw)
    }

    pub const fn raw(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for IpProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An inclusive port range. `end == 0` matches the single port `start`;
/// the all-zero range matches any port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub const ANY: Self = PortRange { start: 0, end: 0 };

    pub const fn single(port: u16) -> Self {
        PortRange {
            start: port,
            end: 0,
        }
    }

    pub const fn is_any(&self) -> bool {
        self.start == 0 && self.end == 0
    }
}

/// A 5-tuple classification key. Unset fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiveTuple {
    pub src_ip: Option<IpAddr>,
    pub dst_ip: Option<IpAddr>,
    pub src_port: PortRange,
    pub dst_port: PortRange,
    pub proto: Option<IpProto>,
}

impl FiveTuple {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_src_ip(mut self, addr: IpAddr) -> Self {
        self.src_ip = Some(addr);
        self
    }

    pub fn with_dst_ip(mut self, addr: IpAddr) -> Self {
        self.dst_ip = Some(addr);
        self
    }

    pub fn with_dst_port(mut self, range: PortRange) -> Self {
        self.dst_port = range;
        self
    }

    pub fn with_proto(mut self, proto: IpProto) -> Self {
        self.proto = Some(proto);
        self
    }
}

/// A VxLAN match descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VxlanDescriptor {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub dst_port: u16,
    pub vni: u32,
}

/// Match condition attached to a forwarding-graph connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Match {
    /// Unicast destined to the receiving entity itself.
    EthDstSelf,
    EthDstBroadcast,
    EthDstMulticast,
    /// Any packet destined to an IPv4 address owned by the VRF.
    Ipv4DstSelf,
    /// IPv4 destination equals the given address.
    Ipv4Dst(IpAddr),
    /// Traffic leaving through a specific VIF.
    OutVif(VifIndex),
    FiveTuple(FiveTuple),
    Vxlan(VxlanDescriptor),
}
