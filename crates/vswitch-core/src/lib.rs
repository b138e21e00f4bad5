//! VRF registry and forwarding-graph wiring engine.
//!
//! This crate is the control plane of a software virtual switch/router.
//! It manages Virtual Routing & Forwarding instances, wires them into the
//! packet-forwarding module graph, attaches and detaches virtual
//! interfaces, and activates tunnel encapsulations.
//!
//! # Architecture
//!
//! ```text
//! [management plane] ──> [VrfRegistry] ──> [Vrf] ──> router / tap modules
//!                              │             │
//!                              │             └──> VIFs, routing + PBR tables
//!                              └──> Notifier (observer bus)
//! ```
//!
//! The dataplane (router and tap modules, VIFs, the global VIF-index
//! space) is external; the control plane drives it through the traits in
//! [`graph`]. Every multi-step graph mutation follows a strict
//! forward/rollback protocol: each completed step registers its
//! compensating action, and the first failure unwinds the completed steps
//! in reverse order before the error is surfaced.
//!
//! # Key components
//!
//! - [`VrfRegistry`]: process-wide VRF directory with index allocation
//! - [`Vrf`]: one routing/forwarding domain and its owned graph objects
//! - [`RoutingTable`] / [`PbrTable`]: committed route and policy entries
//! - [`SaDatabases`]: lazily-created IPsec SAD/SPD pair
//! - [`Notifier`]: observer seam for add/delete events

mod error;
mod graph;
mod notify;
mod registry;
mod rollback;
mod routing;
mod sadb;
mod vrf;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{GraphError, VrfError, VrfResult};
pub use graph::{
    DeviceKind, ForwardingModule, Interface, ModuleFactory, OutputDevice, PathHandle,
    RouterModule, Vif, VifIndexSpace, VrfRef,
};
pub use notify::{Event, EventDetail, EventKind, NoopNotifier, Notifier};
pub use registry::{VrfRegistry, MAX_VRF};
pub use routing::{Nexthop, PbrEntry, PbrTable, Route, RoutingTable};
pub use sadb::{SaDatabases, SecurityAssociation, SecurityPolicy};
pub use vrf::{AttachedDevice, Vrf};
