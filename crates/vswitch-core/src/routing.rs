//! Routing and policy-based-routing tables owned by a VRF.
//!
//! The tables store committed entries only. Reactions to a commit
//! (output-device registration, notifications) happen in the owning
//! [`Vrf`](crate::Vrf).

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::Arc;

use vswitch_types::{FiveTuple, IpPrefix};

use crate::graph::OutputDevice;

/// A next hop referenced by a route or policy entry.
#[derive(Debug, Clone)]
pub struct Nexthop {
    pub gateway: Option<IpAddr>,
    pub weight: u32,
    pub dev: Option<Arc<dyn OutputDevice>>,
}

impl Nexthop {
    /// Next hop through a gateway reachable via `dev`.
    pub fn via(gateway: IpAddr, dev: Arc<dyn OutputDevice>) -> Self {
        Nexthop {
            gateway: Some(gateway),
            weight: 0,
            dev: Some(dev),
        }
    }

    /// Next hop directly out of `dev`.
    pub fn device(dev: Arc<dyn OutputDevice>) -> Self {
        Nexthop {
            gateway: None,
            weight: 0,
            dev: Some(dev),
        }
    }
}

/// A routing-table entry.
#[derive(Debug, Clone)]
pub struct Route {
    pub prefix: IpPrefix,
    /// Egress device of a connected route (one with no next hops).
    pub dev: Option<Arc<dyn OutputDevice>>,
    pub nexthops: Vec<Nexthop>,
}

impl Route {
    /// A connected route out of `dev`.
    pub fn connected(prefix: IpPrefix, dev: Arc<dyn OutputDevice>) -> Self {
        Route {
            prefix,
            dev: Some(dev),
            nexthops: Vec::new(),
        }
    }

    /// A route forwarded through the given next hops.
    pub fn with_nexthops(prefix: IpPrefix, nexthops: Vec<Nexthop>) -> Self {
        Route {
            prefix,
            dev: None,
            nexthops,
        }
    }
}

/// Destination-driven routing table.
#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: HashMap<IpPrefix, Route>,
}

impl RoutingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Commits `route`, replacing any entry for the same prefix.
    pub(crate) fn insert(&mut self, route: Route) -> Option<Route> {
        self.entries.insert(route.prefix, route)
    }

    pub(crate) fn remove(&mut self, prefix: &IpPrefix) -> Option<Route> {
        self.entries.remove(prefix)
    }

    pub fn get(&self, prefix: &IpPrefix) -> Option<&Route> {
        self.entries.get(prefix)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A policy-based-routing entry.
#[derive(Debug, Clone)]
pub struct PbrEntry {
    pub priority: u32,
    pub selector: FiveTuple,
    pub nexthops: Vec<Nexthop>,
}

/// Policy-based-routing table, ordered by priority.
#[derive(Debug, Default)]
pub struct PbrTable {
    entries: BTreeMap<u32, PbrEntry>,
}

impl PbrTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Commits `entry`, replacing any entry of the same priority.
    pub(crate) fn insert(&mut self, entry: PbrEntry) -> Option<PbrEntry> {
        self.entries.insert(entry.priority, entry)
    }

    pub(crate) fn remove(&mut self, priority: u32) -> Option<PbrEntry> {
        self.entries.remove(&priority)
    }

    pub fn get(&self, priority: u32) -> Option<&PbrEntry> {
        self.entries.get(&priority)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_table_insert_replace_remove() {
        let mut table = RoutingTable::new();
        let prefix: IpPrefix = "10.0.0.0/8".parse().unwrap();

        assert!(table.insert(Route::with_nexthops(prefix, Vec::new())).is_none());
        assert_eq!(table.len(), 1);

        // same prefix replaces
        assert!(table.insert(Route::with_nexthops(prefix, Vec::new())).is_some());
        assert_eq!(table.len(), 1);

        assert!(table.remove(&prefix).is_some());
        assert!(table.is_empty());
        assert!(table.remove(&prefix).is_none());
    }

    #[test]
    fn test_pbr_table_priority_keyed() {
        let mut table = PbrTable::new();
        let entry = PbrEntry {
            priority: 10,
            selector: FiveTuple::new(),
            nexthops: Vec::new(),
        };
        assert!(table.insert(entry.clone()).is_none());
        assert!(table.insert(entry).is_some());
        assert_eq!(table.len(), 1);
        assert!(table.get(10).is_some());
        assert!(table.remove(10).is_some());
        assert!(table.is_empty());
    }
}
