//! Process-wide VRF registry: name and index directories, slot
//! allocation, and the transactional create/destroy protocol.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info, warn};

use vswitch_types::{Match, VrfIndex, VrfName};

use crate::error::{VrfError, VrfResult};
use crate::graph::{ModuleFactory, VifIndexSpace};
use crate::notify::{Event, EventDetail, EventKind, Notifier};
use crate::rollback::UndoStack;
use crate::vrf::Vrf;

/// Capacity of the VRF index space.
pub const MAX_VRF: usize = 64;

struct RegistryInner {
    by_name: HashMap<String, Arc<Vrf>>,
    by_index: Vec<Option<Arc<Vrf>>>,
    next_index: usize,
    rds: HashSet<u64>,
}

impl RegistryInner {
    fn find_slot(&mut self, from: usize, to: usize) -> Option<VrfIndex> {
        for i in from..to {
            if self.by_index[i].is_none() {
                self.next_index = (i + 1) % self.by_index.len();
                return Some(VrfIndex::new(i as u32));
            }
        }
        None
    }

    /// Finds a free slot, probing circularly from `next_index` and
    /// wrapping around exactly once. `None` means capacity exhausted.
    fn assign_index(&mut self) -> Option<VrfIndex> {
        let start = self.next_index;
        if let Some(index) = self.find_slot(start, MAX_VRF) {
            return Some(index);
        }
        self.find_slot(0, start)
    }

    fn release_index(&mut self, index: VrfIndex) {
        self.by_index[index.as_usize()] = None;
    }
}

/// Directory of live VRF instances.
///
/// Keyed both by name and by index; the two views always agree. Every
/// registry-mutating operation (creation, destruction, RD assignment,
/// enumeration) is serialized by one exclusive lock covering the name
/// map, the index array, the RD set and the allocation cursor together.
/// The lock is never held across blocking I/O.
pub struct VrfRegistry {
    inner: Mutex<RegistryInner>,
    modules: Arc<dyn ModuleFactory>,
    vif_space: Arc<dyn VifIndexSpace>,
    notifier: Arc<dyn Notifier>,
}

impl VrfRegistry {
    pub fn new(
        modules: Arc<dyn ModuleFactory>,
        vif_space: Arc<dyn VifIndexSpace>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        VrfRegistry {
            inner: Mutex::new(RegistryInner {
                by_name: HashMap::new(),
                by_index: vec![None; MAX_VRF],
                next_index: 0,
                rds: HashSet::new(),
            }),
            modules,
            vif_space,
            notifier,
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a VRF named `name`.
    ///
    /// The creation sequence (index assignment, VIF-index allocation,
    /// tap and router creation, default-rule installation, registration)
    /// either completes as a whole or is rolled back step by step in
    /// reverse order, leaving no side effects behind the surfaced error.
    pub fn create_vrf(&self, name: &str) -> VrfResult<Arc<Vrf>> {
        let name: VrfName = name.parse()?;

        let mut inner = self.lock_inner();
        if inner.by_name.contains_key(name.as_str()) {
            return Err(VrfError::AlreadyExists(name.to_string()));
        }

        let index = inner.assign_index().ok_or(VrfError::CapacityExhausted)?;
        let vrf = match self.build_vrf(&name, index) {
            Ok(vrf) => vrf,
            Err(e) => {
                inner.release_index(index);
                return Err(e);
            }
        };

        inner.by_name.insert(name.to_string(), Arc::clone(&vrf));
        inner.by_index[index.as_usize()] = Some(Arc::clone(&vrf));
        drop(inner);

        info!(vrf = %name, index = %index, "created VRF");
        self.notifier
            .notify(Event::vrf_scoped(EventKind::Add, &name, EventDetail::Vrf));
        Ok(vrf)
    }

    /// Steps of the creation protocol past index assignment. Completed
    /// steps are undone in reverse order when a later one fails.
    fn build_vrf(&self, name: &VrfName, index: VrfIndex) -> VrfResult<Arc<Vrf>> {
        let mut undo = UndoStack::new();

        let vif_index = self
            .vif_space
            .allocate(name.as_str())
            .map_err(|source| VrfError::VifIndexAllocation { source })?;
        {
            let vif_space = Arc::clone(&self.vif_space);
            undo.defer(move || {
                if let Err(e) = vif_space.release(vif_index) {
                    warn!(%vif_index, error = %e, "releasing VIF index during rollback failed");
                }
            });
        }

        let tap = self
            .modules
            .new_tap(name)
            .map_err(|source| VrfError::TapCreation { source })?;
        {
            let tap = Arc::clone(&tap);
            undo.defer(move || tap.free());
        }

        let router = self
            .modules
            .new_router(name, index)
            .map_err(|source| VrfError::RouterCreation { source })?;
        {
            let router = Arc::clone(&router);
            undo.defer(move || router.free());
        }

        // Hand every packet destined to a VRF-local IPv4 address to the
        // ICMP processor.
        router.connect(tap.input(), Match::Ipv4DstSelf)?;

        undo.commit();
        Ok(Arc::new(Vrf::new(
            name.clone(),
            index,
            vif_index,
            router,
            tap,
            Arc::clone(&self.notifier),
        )))
    }

    /// Destroys `vrf`: detaches every still-attached VIF, tears the
    /// owned modules out of the graph, and releases every identity the
    /// VRF held. A VIF-index release failure is logged but does not
    /// block destruction.
    pub fn destroy_vrf(&self, vrf: &Arc<Vrf>) {
        use crate::graph::OutputDevice;

        let mut inner = self.lock_inner();

        for vif in vrf.vifs() {
            if let Err(e) = vrf.delete_vif(&vif) {
                warn!(vrf = %vrf.name(), vif = vif.name(), error = %e, "detaching VIF during destroy failed");
            }
        }

        vrf.teardown_modules();
        inner.by_name.remove(vrf.name().as_str());
        inner.release_index(vrf.index());

        if let Err(e) = self.vif_space.release(vrf.vif_index()) {
            error!(vrf = %vrf.name(), error = %e, "freeing VIF index failed");
        }

        let rd = vrf.rd();
        if rd != 0 {
            inner.rds.remove(&rd);
        }
        drop(inner);

        info!(vrf = %vrf.name(), "destroyed VRF");
        self.notifier.notify(Event::vrf_scoped(
            EventKind::Delete,
            vrf.name(),
            EventDetail::Vrf,
        ));
    }

    /// Sets the route distinguisher of `vrf`.
    ///
    /// A non-zero RD must be unique among live VRFs; re-setting a VRF's
    /// RD frees its previous value for reuse. An RD of 0 clears the
    /// assignment.
    pub fn set_rd(&self, vrf: &Arc<Vrf>, rd: u64) -> VrfResult<()> {
        let mut inner = self.lock_inner();

        if rd != 0 && inner.rds.contains(&rd) {
            return Err(VrfError::RdInUse(rd));
        }

        let old = vrf.rd();
        vrf.set_rd_value(rd);
        if rd != 0 {
            inner.rds.insert(rd);
        }
        if old != 0 {
            inner.rds.remove(&old);
        }
        Ok(())
    }

    pub fn vrf_by_name(&self, name: &str) -> Option<Arc<Vrf>> {
        self.lock_inner().by_name.get(name).cloned()
    }

    pub fn vrf_by_index(&self, index: VrfIndex) -> Option<Arc<Vrf>> {
        self.lock_inner()
            .by_index
            .get(index.as_usize())
            .and_then(Clone::clone)
    }

    /// Snapshot of every live VRF.
    pub fn all_vrfs(&self) -> Vec<Arc<Vrf>> {
        self.lock_inner().by_name.values().cloned().collect()
    }

    pub fn vrf_count(&self) -> usize {
        self.lock_inner().by_name.len()
    }
}
