//! Mock dataplane for the crate's tests: recording modules, VIFs and
//! index space with fault injection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use vswitch_types::{Match, TunnelConfig, VifIndex, VrfIndex, VrfName};

use crate::error::GraphError;
use crate::graph::{
    DeviceKind, ForwardingModule, Interface, ModuleFactory, OutputDevice, PathHandle,
    RouterModule, Vif, VifIndexSpace, VrfRef,
};
use crate::notify::{Event, Notifier};
use crate::registry::VrfRegistry;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A recording forwarding module, usable as tap or router.
#[derive(Default)]
pub(crate) struct MockModule {
    name: String,
    rules: Mutex<Vec<(PathHandle, Match)>>,
    enabled: AtomicBool,
    freed: AtomicBool,
    vifs: Mutex<Vec<VifIndex>>,
    output_devices: Mutex<Vec<VifIndex>>,
    napt: Mutex<HashSet<VifIndex>>,
    fail_connect: Mutex<HashSet<Match>>,
    fail_add_vif: AtomicBool,
    fail_napt: AtomicBool,
    fail_enable: AtomicBool,
}

impl MockModule {
    pub(crate) fn named(name: impl Into<String>) -> Self {
        MockModule {
            name: name.into(),
            ..Default::default()
        }
    }

    pub(crate) fn fail_connect_on(&self, selector: Match) {
        lock(&self.fail_connect).insert(selector);
    }

    pub(crate) fn fail_add_vif(&self, fail: bool) {
        self.fail_add_vif.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_napt(&self, fail: bool) {
        self.fail_napt.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_enable(&self, fail: bool) {
        self.fail_enable.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn rule_count(&self) -> usize {
        lock(&self.rules).len()
    }

    pub(crate) fn has_rule(&self, selector: &Match) -> bool {
        lock(&self.rules).iter().any(|(_, m)| m == selector)
    }

    pub(crate) fn has_rule_to(&self, path: &PathHandle, selector: &Match) -> bool {
        lock(&self.rules)
            .iter()
            .any(|(p, m)| p == path && m == selector)
    }

    pub(crate) fn vif_count(&self) -> usize {
        lock(&self.vifs).len()
    }

    pub(crate) fn output_device_count(&self) -> usize {
        lock(&self.output_devices).len()
    }

    pub(crate) fn is_napt_enabled_for(&self, index: VifIndex) -> bool {
        lock(&self.napt).contains(&index)
    }

    pub(crate) fn is_freed(&self) -> bool {
        self.freed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl ForwardingModule for MockModule {
    fn connect(&self, path: PathHandle, selector: Match) -> Result<(), GraphError> {
        if lock(&self.fail_connect).contains(&selector) {
            return Err(GraphError::new(format!(
                "{}: connect refused for {:?}",
                self.name, selector
            )));
        }
        lock(&self.rules).push((path, selector));
        Ok(())
    }

    fn disconnect(&self, selector: Match) {
        lock(&self.rules).retain(|(_, m)| *m != selector);
    }

    fn enable(&self) -> Result<(), GraphError> {
        if self.fail_enable.load(Ordering::SeqCst) {
            return Err(GraphError::new(format!("{}: enable refused", self.name)));
        }
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn input(&self) -> PathHandle {
        PathHandle::new(format!("{}:input", self.name))
    }

    fn free(&self) {
        self.freed.store(true, Ordering::SeqCst);
    }
}

impl RouterModule for MockModule {
    fn add_vif(&self, vif: Arc<dyn Vif>) -> Result<(), GraphError> {
        if self.fail_add_vif.load(Ordering::SeqCst) {
            return Err(GraphError::new(format!("{}: add_vif refused", self.name)));
        }
        lock(&self.vifs).push(vif.vif_index());
        Ok(())
    }

    fn delete_vif(&self, vif: &dyn Vif) -> Result<(), GraphError> {
        lock(&self.vifs).retain(|&i| i != vif.vif_index());
        Ok(())
    }

    fn add_output_device(&self, dev: Arc<dyn OutputDevice>) -> Result<(), GraphError> {
        lock(&self.output_devices).push(dev.vif_index());
        Ok(())
    }

    fn enable_napt(&self, vif: &dyn Vif) -> Result<(), GraphError> {
        if self.fail_napt.load(Ordering::SeqCst) {
            return Err(GraphError::new(format!(
                "{}: enable_napt refused",
                self.name
            )));
        }
        lock(&self.napt).insert(vif.vif_index());
        Ok(())
    }

    fn disable_napt(&self, vif: &dyn Vif) -> Result<(), GraphError> {
        lock(&self.napt).remove(&vif.vif_index());
        Ok(())
    }
}

/// Factory handing out recording modules, with per-step fault switches.
#[derive(Default)]
pub(crate) struct MockFactory {
    taps: Mutex<Vec<Arc<MockModule>>>,
    routers: Mutex<Vec<Arc<MockModule>>>,
    fail_tap: AtomicBool,
    fail_router: AtomicBool,
    fail_default_rule: AtomicBool,
}

impl MockFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_tap(&self, fail: bool) {
        self.fail_tap.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_router(&self, fail: bool) {
        self.fail_router.store(fail, Ordering::SeqCst);
    }

    /// Makes the next router refuse the router→tap default rule.
    pub(crate) fn fail_default_rule(&self, fail: bool) {
        self.fail_default_rule.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn last_tap(&self) -> Arc<MockModule> {
        Arc::clone(lock(&self.taps).last().expect("no tap created"))
    }

    pub(crate) fn last_router(&self) -> Arc<MockModule> {
        Arc::clone(lock(&self.routers).last().expect("no router created"))
    }

    /// Router created by the i-th successful `new_router` call.
    pub(crate) fn router(&self, i: usize) -> Arc<MockModule> {
        Arc::clone(&lock(&self.routers)[i])
    }
}

impl ModuleFactory for MockFactory {
    fn new_tap(&self, vrf: &VrfName) -> Result<Arc<dyn ForwardingModule>, GraphError> {
        if self.fail_tap.load(Ordering::SeqCst) {
            return Err(GraphError::new("tap backend unavailable"));
        }
        let tap = Arc::new(MockModule::named(format!("{vrf}-tap")));
        lock(&self.taps).push(Arc::clone(&tap));
        Ok(tap)
    }

    fn new_router(
        &self,
        vrf: &VrfName,
        _index: VrfIndex,
    ) -> Result<Arc<dyn RouterModule>, GraphError> {
        if self.fail_router.load(Ordering::SeqCst) {
            return Err(GraphError::new("router backend unavailable"));
        }
        let router = Arc::new(MockModule::named(format!("{vrf}-router")));
        if self.fail_default_rule.load(Ordering::SeqCst) {
            router.fail_connect_on(Match::Ipv4DstSelf);
        }
        lock(&self.routers).push(Arc::clone(&router));
        Ok(router)
    }
}

/// Recording global VIF-index space.
pub(crate) struct MockVifSpace {
    next: AtomicU32,
    allocated: Mutex<HashSet<VifIndex>>,
    fail_allocate: AtomicBool,
}

impl MockVifSpace {
    pub(crate) fn new() -> Self {
        MockVifSpace {
            next: AtomicU32::new(1000),
            allocated: Mutex::new(HashSet::new()),
            fail_allocate: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_allocate(&self, fail: bool) {
        self.fail_allocate.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn allocated_count(&self) -> usize {
        lock(&self.allocated).len()
    }
}

impl VifIndexSpace for MockVifSpace {
    fn allocate(&self, _owner: &str) -> Result<VifIndex, GraphError> {
        if self.fail_allocate.load(Ordering::SeqCst) {
            return Err(GraphError::new("VIF index space exhausted"));
        }
        let index = VifIndex::new(self.next.fetch_add(1, Ordering::SeqCst));
        lock(&self.allocated).insert(index);
        Ok(index)
    }

    fn release(&self, index: VifIndex) -> Result<(), GraphError> {
        if lock(&self.allocated).remove(&index) {
            Ok(())
        } else {
            Err(GraphError::new(format!("VIF index {index} not allocated")))
        }
    }
}

/// A recording VIF.
pub(crate) struct MockVif {
    name: String,
    index: VifIndex,
    napt: bool,
    tunnel: Option<TunnelConfig>,
    vrf: Mutex<Option<VrfRef>>,
    rules: Mutex<Vec<(PathHandle, Match)>>,
    fail_connect: Mutex<HashSet<Match>>,
    fail_set_vrf: AtomicBool,
}

impl MockVif {
    pub(crate) fn new(name: impl Into<String>, index: u32) -> Self {
        MockVif {
            name: name.into(),
            index: VifIndex::new(index),
            napt: false,
            tunnel: None,
            vrf: Mutex::new(None),
            rules: Mutex::new(Vec::new()),
            fail_connect: Mutex::new(HashSet::new()),
            fail_set_vrf: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_tunnel(mut self, tunnel: TunnelConfig) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    pub(crate) fn with_napt(mut self) -> Self {
        self.napt = true;
        self
    }

    pub(crate) fn fail_connect_on(&self, selector: Match) {
        lock(&self.fail_connect).insert(selector);
    }

    pub(crate) fn fail_set_vrf(&self, fail: bool) {
        self.fail_set_vrf.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn bound_vrf(&self) -> Option<VrfRef> {
        lock(&self.vrf).clone()
    }

    pub(crate) fn rule_count(&self) -> usize {
        lock(&self.rules).len()
    }

    pub(crate) fn has_rule(&self, selector: &Match) -> bool {
        lock(&self.rules).iter().any(|(_, m)| m == selector)
    }
}

impl std::fmt::Debug for MockVif {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockVif")
            .field("name", &self.name)
            .field("index", &self.index)
            .finish()
    }
}

impl Interface for MockVif {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, path: PathHandle, selector: Match) -> Result<(), GraphError> {
        if lock(&self.fail_connect).contains(&selector) {
            return Err(GraphError::new(format!(
                "{}: connect refused for {:?}",
                self.name, selector
            )));
        }
        lock(&self.rules).push((path, selector));
        Ok(())
    }

    fn disconnect(&self, selector: Match) {
        lock(&self.rules).retain(|(_, m)| *m != selector);
    }

    fn tunnel(&self) -> Option<TunnelConfig> {
        self.tunnel.clone()
    }

    fn inbound(&self) -> PathHandle {
        PathHandle::new(format!("{}:in", self.name))
    }

    fn outbound(&self) -> PathHandle {
        PathHandle::new(format!("{}:out", self.name))
    }
}

impl OutputDevice for MockVif {
    fn vif_index(&self) -> VifIndex {
        self.index
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Vif
    }
}

impl Vif for MockVif {
    fn set_vrf(&self, vrf: Option<VrfRef>) -> Result<(), GraphError> {
        if self.fail_set_vrf.load(Ordering::SeqCst) {
            return Err(GraphError::new(format!("{}: set_vrf refused", self.name)));
        }
        *lock(&self.vrf) = vrf;
        Ok(())
    }

    fn is_napt_enabled(&self) -> bool {
        self.napt
    }
}

/// Notifier recording every event it sees.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: Event) {
        lock(&self.events).push(event);
    }
}

/// A registry wired to fresh mocks, plus handles to the mocks.
pub(crate) struct TestEnv {
    pub(crate) registry: VrfRegistry,
    pub(crate) factory: Arc<MockFactory>,
    pub(crate) vif_space: Arc<MockVifSpace>,
    pub(crate) notifier: Arc<RecordingNotifier>,
}

pub(crate) fn test_env() -> TestEnv {
    let factory = Arc::new(MockFactory::new());
    let vif_space = Arc::new(MockVifSpace::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = VrfRegistry::new(
        Arc::clone(&factory) as Arc<dyn ModuleFactory>,
        Arc::clone(&vif_space) as Arc<dyn VifIndexSpace>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
    );
    TestEnv {
        registry,
        factory,
        vif_space,
        notifier,
    }
}

/// Casts a `MockVif` to the trait object the control plane consumes.
pub(crate) fn as_vif(vif: &Arc<MockVif>) -> Arc<dyn Vif> {
    Arc::clone(vif) as Arc<dyn Vif>
}
