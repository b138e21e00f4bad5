//! Common types for the vswitch control plane.
//!
//! This crate provides type-safe representations of the primitives shared
//! by the VRF registry, the forwarding-graph wiring engine and the PF_KEY
//! transport:
//!
//! - [`VrfIndex`] / [`VifIndex`]: slot identifiers in the VRF and global
//!   VIF index spaces
//! - [`VrfName`]: a validated VRF name (`vrf<digits>`)
//! - [`IpPrefix`]: IP network prefixes (CIDR notation)
//! - [`Match`], [`FiveTuple`], [`VxlanDescriptor`]: packet-classification
//!   keys consumed by the forwarding graph
//! - [`TunnelConfig`]: tunnel encapsulation attributes of a VIF or
//!   interface

mod flow;
mod index;
mod ip;
mod name;
mod tunnel;

pub use flow::{FiveTuple, IpProto, Match, PortRange, VxlanDescriptor};
pub use index::{VifIndex, VrfIndex};
pub use ip::IpPrefix;
pub use name::VrfName;
pub use tunnel::{EncapsMethod, SecurityMode, TunnelConfig, VXLAN_DEFAULT_PORT};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid VRF name: '{0}'")]
    InvalidVrfName(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),
}
