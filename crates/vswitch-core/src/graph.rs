//! Interfaces at the forwarding-graph boundary.
//!
//! The packet-forwarding modules (router, tap), the VIFs and the global
//! VIF-index space belong to the dataplane; the control plane drives them
//! through the traits below. Implementations live outside this crate.

use std::fmt;
use std::sync::Arc;

use vswitch_types::{Match, TunnelConfig, VifIndex, VrfIndex, VrfName};

use crate::error::GraphError;

/// Opaque label of a forwarding path (an input or output ring of a
/// module or interface).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathHandle(String);

impl PathHandle {
    pub fn new(label: impl Into<String>) -> Self {
        PathHandle(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What an [`OutputDevice`] is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Vif,
    Vrf,
}

/// Anything a route or policy entry can name as a forwarding
/// destination: a VIF, or another VRF acting as a next hop.
pub trait OutputDevice: fmt::Debug + Send + Sync {
    /// Slot of this device in the global VIF-index space.
    fn vif_index(&self) -> VifIndex;

    fn kind(&self) -> DeviceKind;
}

/// Identity of the VRF an interface is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrfRef {
    pub name: VrfName,
    pub index: VrfIndex,
}

/// A packet-forwarding module instance (router or tap).
pub trait ForwardingModule: Send + Sync {
    /// Installs a rule routing traffic matching `selector` from this
    /// module to `path`.
    fn connect(&self, path: PathHandle, selector: Match) -> Result<(), GraphError>;

    /// Removes a previously installed rule. Best effort; an unknown rule
    /// is ignored.
    fn disconnect(&self, selector: Match);

    fn enable(&self) -> Result<(), GraphError>;

    fn disable(&self);

    /// Input ring of this module.
    fn input(&self) -> PathHandle;

    /// Releases the underlying dataplane instance.
    fn free(&self);
}

/// The router module exclusively owned by one VRF.
pub trait RouterModule: ForwardingModule {
    fn add_vif(&self, vif: Arc<dyn Vif>) -> Result<(), GraphError>;

    fn delete_vif(&self, vif: &dyn Vif) -> Result<(), GraphError>;

    fn add_output_device(&self, dev: Arc<dyn OutputDevice>) -> Result<(), GraphError>;

    fn enable_napt(&self, vif: &dyn Vif) -> Result<(), GraphError>;

    fn disable_napt(&self, vif: &dyn Vif) -> Result<(), GraphError>;
}

/// A network interface able to source and sink tunnel traffic.
pub trait Interface: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Installs a rule routing traffic matching `selector` from this
    /// interface to `path`.
    fn connect(&self, path: PathHandle, selector: Match) -> Result<(), GraphError>;

    /// Removes a previously installed rule. Best effort.
    fn disconnect(&self, selector: Match);

    fn tunnel(&self) -> Option<TunnelConfig>;

    /// Forwarding path toward the interface's decapsulation side.
    fn inbound(&self) -> PathHandle;

    /// Forwarding path toward the wire.
    fn outbound(&self) -> PathHandle;
}

/// A virtual interface, attachable to exactly one VRF.
pub trait Vif: Interface + OutputDevice {
    /// Binds or unbinds the VIF; `None` detaches it.
    fn set_vrf(&self, vrf: Option<VrfRef>) -> Result<(), GraphError>;

    fn is_napt_enabled(&self) -> bool;
}

/// Factory creating the forwarding modules owned by a VRF.
pub trait ModuleFactory: Send + Sync {
    /// Creates the ICMP/tap module scoped to `vrf`.
    fn new_tap(&self, vrf: &VrfName) -> Result<Arc<dyn ForwardingModule>, GraphError>;

    /// Creates the router module scoped to `vrf`.
    fn new_router(&self, vrf: &VrfName, index: VrfIndex)
        -> Result<Arc<dyn RouterModule>, GraphError>;
}

/// The global VIF-index space shared by VIFs and VRFs.
pub trait VifIndexSpace: Send + Sync {
    fn allocate(&self, owner: &str) -> Result<VifIndex, GraphError>;

    fn release(&self, index: VifIndex) -> Result<(), GraphError>;
}
