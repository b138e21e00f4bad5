//! The VRF entity: owned forwarding modules, attached devices, routing
//! state and lifecycle operations.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use serde::{Serialize, Serializer};
use tracing::{debug, error, warn};

use vswitch_types::{
    EncapsMethod, FiveTuple, IpPrefix, IpProto, Match, PortRange, SecurityMode, VifIndex,
    VrfIndex, VrfName, VxlanDescriptor,
};

use crate::error::{VrfError, VrfResult};
use crate::graph::{
    DeviceKind, ForwardingModule, Interface, OutputDevice, RouterModule, Vif, VrfRef,
};
use crate::notify::{EventDetail, EventKind, Notifier};
use crate::rollback::UndoStack;
use crate::routing::{Nexthop, PbrEntry, PbrTable, Route, RoutingTable};
use crate::sadb::SaDatabases;

/// UDP port admitting NAT-traversal-encapsulated ESP traffic.
const NATT_PORT: u16 = 4500;

/// A device recorded in a VRF's device table.
#[derive(Debug, Clone)]
pub enum AttachedDevice {
    /// A VIF attached via [`Vrf::add_vif`].
    Vif(Arc<dyn Vif>),
    /// Another VRF registered as an inter-VRF next hop.
    NextHop(Arc<dyn OutputDevice>),
}

impl AttachedDevice {
    pub fn vif_index(&self) -> VifIndex {
        match self {
            AttachedDevice::Vif(vif) => vif.vif_index(),
            AttachedDevice::NextHop(dev) => dev.vif_index(),
        }
    }

    pub fn as_vif(&self) -> Option<&Arc<dyn Vif>> {
        match self {
            AttachedDevice::Vif(vif) => Some(vif),
            AttachedDevice::NextHop(_) => None,
        }
    }
}

struct VrfState {
    enabled: bool,
    rd: u64,
    router: Arc<dyn RouterModule>,
    tap: Arc<dyn ForwardingModule>,
    devs: HashMap<VifIndex, AttachedDevice>,
    routes: RoutingTable,
    pbr: PbrTable,
}

/// Virtual Routing & Forwarding instance.
///
/// A VRF owns a router and a tap (ICMP) module in the forwarding graph,
/// the set of attached devices, and its routing and PBR tables. Identity
/// (name and indices) is immutable for the lifetime of the instance.
///
/// Graph-mutating operations on one VRF assume a single writer; the
/// internal lock makes concurrent calls safe but their ordering is up to
/// the management plane.
pub struct Vrf {
    name: VrfName,
    index: VrfIndex,
    vif_index: VifIndex,
    notifier: Arc<dyn Notifier>,
    state: Mutex<VrfState>,
    sadb: OnceLock<SaDatabases>,
}

impl Vrf {
    pub(crate) fn new(
        name: VrfName,
        index: VrfIndex,
        vif_index: VifIndex,
        router: Arc<dyn RouterModule>,
        tap: Arc<dyn ForwardingModule>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Vrf {
            name,
            index,
            vif_index,
            notifier,
            state: Mutex::new(VrfState {
                enabled: false,
                rd: 0,
                router,
                tap,
                devs: HashMap::new(),
                routes: RoutingTable::new(),
                pbr: PbrTable::new(),
            }),
            sadb: OnceLock::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, VrfState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, kind: EventKind, detail: EventDetail) {
        self.notifier
            .notify(crate::notify::Event::vrf_scoped(kind, &self.name, detail));
    }

    fn vrf_ref(&self) -> VrfRef {
        VrfRef {
            name: self.name.clone(),
            index: self.index,
        }
    }

    pub fn name(&self) -> &VrfName {
        &self.name
    }

    /// Unique identifier of the VRF.
    pub fn index(&self) -> VrfIndex {
        self.index
    }

    /// Route distinguisher; 0 when unset.
    pub fn rd(&self) -> u64 {
        self.lock_state().rd
    }

    pub(crate) fn set_rd_value(&self, rd: u64) {
        self.lock_state().rd = rd;
    }

    pub fn is_enabled(&self) -> bool {
        self.lock_state().enabled
    }

    /// Enables the VRF's forwarding modules. Idempotent.
    pub fn enable(&self) -> VrfResult<()> {
        let mut st = self.lock_state();
        if st.enabled {
            return Ok(());
        }
        st.tap.enable()?;
        if let Err(e) = st.router.enable() {
            st.tap.disable();
            return Err(e.into());
        }
        st.enabled = true;
        Ok(())
    }

    /// Disables the VRF's forwarding modules. Idempotent.
    pub fn disable(&self) {
        let mut st = self.lock_state();
        if st.enabled {
            st.router.disable();
            st.tap.disable();
            st.enabled = false;
        }
    }

    /// Attaches `vif` to the VRF.
    ///
    /// Attaching an already-attached VIF is a no-op. On any wiring
    /// failure every connection made by this call is undone in reverse
    /// order and the VIF ends up unbound, exactly as before the call.
    pub fn add_vif(&self, vif: &Arc<dyn Vif>) -> VrfResult<()> {
        let mut st = self.lock_state();
        if st.devs.contains_key(&vif.vif_index()) {
            return Ok(());
        }

        vif.set_vrf(Some(self.vrf_ref()))?;
        let mut undo = UndoStack::new();
        {
            let vif = Arc::clone(vif);
            undo.defer(move || {
                if let Err(e) = vif.set_vrf(None) {
                    warn!(vif = vif.name(), error = %e, "unbinding VIF during rollback failed");
                }
            });
        }

        // router -> VIF
        st.router.add_vif(Arc::clone(vif))?;
        {
            let router = Arc::clone(&st.router);
            let vif = Arc::clone(vif);
            undo.defer(move || {
                if let Err(e) = router.delete_vif(vif.as_ref()) {
                    warn!(vif = vif.name(), error = %e, "removing VIF from router during rollback failed");
                }
            });
        }

        // ICMP replies reach the VIF directly unless it is a tunnel.
        if vif.tunnel().is_none() {
            st.tap
                .connect(vif.outbound(), Match::OutVif(vif.vif_index()))?;
            let tap = Arc::clone(&st.tap);
            let selector = Match::OutVif(vif.vif_index());
            undo.defer(move || tap.disconnect(selector));
        }

        // VIF -> router for traffic addressed to us, broadcast, multicast
        for selector in [
            Match::EthDstSelf,
            Match::EthDstBroadcast,
            Match::EthDstMulticast,
        ] {
            vif.connect(st.router.input(), selector.clone())?;
            let vif = Arc::clone(vif);
            undo.defer(move || vif.disconnect(selector));
        }

        if vif.is_napt_enabled() {
            st.router.enable_napt(vif.as_ref())?;
        }

        undo.commit();
        st.devs
            .insert(vif.vif_index(), AttachedDevice::Vif(Arc::clone(vif)));
        drop(st);

        self.notify(EventKind::Add, EventDetail::Vif(vif.vif_index()));
        Ok(())
    }

    /// Detaches `vif`, undoing the attach-time wiring.
    ///
    /// Disconnection is best effort: this is a cleanup path, and partial
    /// disconnect failures are logged rather than rolled back.
    pub fn delete_vif(&self, vif: &Arc<dyn Vif>) -> VrfResult<()> {
        let mut st = self.lock_state();
        if !st.devs.contains_key(&vif.vif_index()) {
            return Err(VrfError::VifNotAttached(vif.vif_index()));
        }

        st.tap.disconnect(Match::OutVif(vif.vif_index()));
        vif.disconnect(Match::EthDstSelf);
        vif.disconnect(Match::EthDstBroadcast);
        vif.disconnect(Match::EthDstMulticast);
        if vif.is_napt_enabled() {
            if let Err(e) = st.router.disable_napt(vif.as_ref()) {
                warn!(vif = vif.name(), error = %e, "disabling NAPT during detach failed");
            }
        }
        if let Err(e) = vif.set_vrf(None) {
            warn!(vif = vif.name(), error = %e, "unbinding VIF failed");
        }
        if let Err(e) = st.router.delete_vif(vif.as_ref()) {
            warn!(vif = vif.name(), error = %e, "removing VIF from router failed");
        }
        st.devs.remove(&vif.vif_index());
        drop(st);

        self.notify(EventKind::Delete, EventDetail::Vif(vif.vif_index()));
        Ok(())
    }

    /// Returns the VIFs currently attached to the VRF.
    pub fn vifs(&self) -> Vec<Arc<dyn Vif>> {
        self.lock_state()
            .devs
            .values()
            .filter_map(AttachedDevice::as_vif)
            .cloned()
            .collect()
    }

    /// True if a device with `index` is recorded in the device table.
    pub fn has_device(&self, index: VifIndex) -> bool {
        self.lock_state().devs.contains_key(&index)
    }

    pub fn device_count(&self) -> usize {
        self.lock_state().devs.len()
    }

    /// Activates an L3 tunnel carried by `vif`.
    ///
    /// An outbound rule routes traffic destined to the first remote
    /// address into the tunnel; each remote address gets an inbound
    /// classification rule (plus a UDP/4500 rule when the tunnel is
    /// IPsec-protected, for NAT-traversal-encapsulated ESP). A failure
    /// unwinds only the rules installed for the failing remote address:
    /// rules for earlier remotes stay active.
    pub fn add_l3_tunnel(&self, vif: &Arc<dyn Vif>) -> VrfResult<()> {
        let st = self.lock_state();
        let tunnel = vif
            .tunnel()
            .ok_or_else(|| VrfError::NotTunnel(vif.name().to_string()))?;
        let remotes = tunnel.remote_addresses().to_vec();
        let Some(&first) = remotes.first() else {
            return Err(VrfError::NoRemoteAddress(vif.name().to_string()));
        };

        let outbound = Match::Ipv4Dst(first);
        vif.connect(st.router.input(), outbound.clone())?;

        let local = tunnel.local_address();
        for remote in remotes {
            let ft = FiveTuple::new()
                .with_src_ip(remote)
                .with_dst_ip(local)
                .with_proto(tunnel.ip_proto());
            if let Err(e) = st
                .router
                .connect(vif.inbound(), Match::FiveTuple(ft.clone()))
            {
                vif.disconnect(outbound);
                return Err(e.into());
            }

            // NAT traversal, when the tunnel is IPsec-protected
            if tunnel.security() == SecurityMode::IpSec {
                let natt = FiveTuple::new()
                    .with_src_ip(remote)
                    .with_dst_ip(local)
                    .with_dst_port(PortRange::single(NATT_PORT))
                    .with_proto(IpProto::UDP);
                if let Err(e) = st.router.connect(vif.inbound(), Match::FiveTuple(natt)) {
                    st.router.disconnect(Match::FiveTuple(ft));
                    vif.disconnect(outbound);
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    /// L3 tunnel teardown is not implemented.
    pub fn delete_l3_tunnel(&self, vif: &Arc<dyn Vif>) -> VrfResult<()> {
        warn!(vrf = %self.name, vif = vif.name(), "L3 tunnel teardown is not supported");
        Err(VrfError::Unsupported("L3 tunnel teardown"))
    }

    /// Activates an L2 tunnel carried by `iface`.
    ///
    /// Inbound-rule failures are surfaced as
    /// [`VrfError::FatalWiring`] without rollback: they indicate a graph
    /// construction defect, and the caller must treat them as fatal.
    pub fn add_l2_tunnel(&self, iface: &Arc<dyn Interface>) -> VrfResult<()> {
        let st = self.lock_state();
        let tunnel = iface
            .tunnel()
            .ok_or_else(|| VrfError::NotTunnel(iface.name().to_string()))?;
        let remotes = tunnel.remote_addresses();
        let Some(&first) = remotes.first() else {
            return Err(VrfError::NoRemoteAddress(iface.name().to_string()));
        };

        let local = tunnel.local_address();
        let inbound_selectors: Vec<Match> = match tunnel.encaps_method() {
            EncapsMethod::Gre => remotes
                .iter()
                .map(|&remote| {
                    Match::FiveTuple(
                        FiveTuple::new()
                            .with_src_ip(remote)
                            .with_dst_ip(local)
                            .with_proto(IpProto::GRE),
                    )
                })
                .collect(),
            EncapsMethod::Vxlan => remotes
                .iter()
                .map(|&remote| {
                    Match::Vxlan(VxlanDescriptor {
                        src: remote,
                        dst: local,
                        dst_port: tunnel.vxlan_port(),
                        vni: tunnel.vni(),
                    })
                })
                .collect(),
            other => return Err(VrfError::UnsupportedEncaps(other)),
        };

        iface.connect(st.router.input(), Match::Ipv4Dst(first))?;

        for selector in inbound_selectors {
            if let Err(e) = st.router.connect(iface.inbound(), selector) {
                error!(vrf = %self.name, iface = iface.name(), error = %e,
                    "can't connect L2 tunnel to the router");
                return Err(VrfError::FatalWiring(e));
            }
        }

        Ok(())
    }

    /// L2 tunnel teardown is not implemented.
    pub fn delete_l2_tunnel(&self, iface: &Arc<dyn Interface>) -> VrfResult<()> {
        warn!(vrf = %self.name, iface = iface.name(), "L2 tunnel teardown is not supported");
        Err(VrfError::Unsupported("L2 tunnel teardown"))
    }

    pub fn enable_napt(&self, vif: &Arc<dyn Vif>) -> VrfResult<()> {
        self.lock_state()
            .router
            .enable_napt(vif.as_ref())
            .map_err(Into::into)
    }

    pub fn disable_napt(&self, vif: &Arc<dyn Vif>) -> VrfResult<()> {
        self.lock_state()
            .router
            .disable_napt(vif.as_ref())
            .map_err(Into::into)
    }

    /// Registers an output device referenced by a route or policy entry.
    ///
    /// Idempotent over the device table. Only a VRF may arrive through
    /// this path: a VIF must already have been attached via
    /// [`add_vif`](Self::add_vif).
    fn register_output_device(
        st: &mut VrfState,
        dev: &Arc<dyn OutputDevice>,
    ) -> VrfResult<()> {
        if st.devs.contains_key(&dev.vif_index()) {
            return Ok(());
        }
        if dev.kind() != DeviceKind::Vrf {
            return Err(VrfError::NotAVrf(dev.vif_index()));
        }
        st.router.add_output_device(Arc::clone(dev))?;
        st.devs
            .insert(dev.vif_index(), AttachedDevice::NextHop(Arc::clone(dev)));
        Ok(())
    }

    /// Registers every output device `entry` references; a connected
    /// route registers its single egress device.
    fn register_entry_devices(
        &self,
        st: &mut VrfState,
        dev: &Option<Arc<dyn OutputDevice>>,
        nexthops: &[Nexthop],
    ) -> VrfResult<()> {
        if nexthops.is_empty() {
            if let Some(dev) = dev {
                Self::register_output_device(st, dev)?;
            }
        } else {
            for nh in nexthops {
                if let Some(dev) = &nh.dev {
                    Self::register_output_device(st, dev)?;
                }
            }
        }
        Ok(())
    }

    /// Commits `route` and reacts to it: output devices the entry
    /// references are registered in the forwarding graph, and an Add
    /// notification carrying the entry is emitted. A registration
    /// failure is logged and suppresses the notification; the table
    /// entry itself stays committed.
    pub fn add_route(&self, route: Route) {
        let mut st = self.lock_state();
        st.routes.insert(route.clone());
        if let Err(e) = self.register_entry_devices(&mut st, &route.dev, &route.nexthops) {
            error!(vrf = %self.name, error = %e, "output device registration for route failed");
            return;
        }
        drop(st);
        self.notify(EventKind::Add, EventDetail::Route(route));
    }

    /// Removes the route for `prefix`, emitting a Delete notification
    /// when an entry existed.
    ///
    /// Output devices registered on behalf of the entry are not
    /// reclaimed; stale registrations persist.
    pub fn delete_route(&self, prefix: &IpPrefix) -> Option<Route> {
        let mut st = self.lock_state();
        let removed = st.routes.remove(prefix);
        drop(st);
        if let Some(route) = &removed {
            self.notify(EventKind::Delete, EventDetail::Route(route.clone()));
        }
        removed
    }

    pub fn route(&self, prefix: &IpPrefix) -> Option<Route> {
        self.lock_state().routes.get(prefix).cloned()
    }

    pub fn route_count(&self) -> usize {
        self.lock_state().routes.len()
    }

    /// Commits a PBR entry; reaction mirrors [`add_route`](Self::add_route).
    /// Next hops without a device are skipped.
    pub fn add_pbr_entry(&self, entry: PbrEntry) {
        let mut st = self.lock_state();
        st.pbr.insert(entry.clone());
        if let Err(e) = self.register_entry_devices(&mut st, &None, &entry.nexthops) {
            error!(vrf = %self.name, error = %e, "output device registration for PBR entry failed");
            return;
        }
        drop(st);
        self.notify(EventKind::Add, EventDetail::Pbr(entry));
    }

    /// Removes the PBR entry of `priority`, emitting a Delete
    /// notification when an entry existed.
    pub fn delete_pbr_entry(&self, priority: u32) -> Option<PbrEntry> {
        let mut st = self.lock_state();
        let removed = st.pbr.remove(priority);
        drop(st);
        if let Some(entry) = &removed {
            self.notify(EventKind::Delete, EventDetail::Pbr(entry.clone()));
        }
        removed
    }

    pub fn pbr_count(&self) -> usize {
        self.lock_state().pbr.len()
    }

    /// Returns the VRF's SA databases, creating them on first access.
    pub fn sadb(&self) -> &SaDatabases {
        self.sadb.get_or_init(SaDatabases::new)
    }

    /// True if the SA databases have been created.
    pub fn has_sadb(&self) -> bool {
        self.sadb.get().is_some()
    }

    /// Removes the default forwarding rule and frees the owned modules.
    /// Called by the registry during destruction, after every VIF has
    /// been detached.
    pub(crate) fn teardown_modules(&self) {
        let st = self.lock_state();
        st.router.disconnect(Match::Ipv4DstSelf);
        st.tap.free();
        st.router.free();
        debug!(vrf = %self.name, "forwarding modules released");
    }
}

impl OutputDevice for Vrf {
    /// The VRF's own slot in the global VIF-index space, used when the
    /// VRF appears as an inter-VRF next hop.
    fn vif_index(&self) -> VifIndex {
        self.vif_index
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Vrf
    }
}

impl fmt::Debug for Vrf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vrf")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("vif_index", &self.vif_index)
            .finish()
    }
}

impl fmt::Display for Vrf {
    /// Dump format: identity, RD, attached devices, and the SAD/SPD
    /// contents when the SA databases exist.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.lock_state();
        write!(f, "{}: RD={}. {} DEV(s):", self.name, st.rd, st.devs.len())?;
        for dev in st.devs.values() {
            match dev {
                AttachedDevice::Vif(vif) => write!(f, " {}", vif.name())?,
                AttachedDevice::NextHop(dev) => write!(f, " vif{}", dev.vif_index())?,
            }
        }
        drop(st);

        if let Some(sadb) = self.sadb.get() {
            let sad = sadb.sad();
            write!(f, "\n{} SAD", sad.len())?;
            for sa in sad {
                write!(f, "\n\t{}", sa)?;
            }
            let spd = sadb.spd();
            write!(f, "\n{} SPD", spd.len())?;
            for sp in spd {
                write!(f, "\n\t{}", sp)?;
            }
        }
        Ok(())
    }
}

impl Serialize for Vrf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name.as_str())
    }
}
