//! Per-VRF PF_KEY handler: local-socket listener lifecycle, accept loop
//! and per-connection relay tasks.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use vswitch_core::Vrf;
use vswitch_types::{VrfIndex, VrfName};

use crate::conns::ConnTable;
use crate::framing::read_message;
use crate::mux::MsgMuxFactory;

/// Configuration of the PF_KEY transport.
#[derive(Debug, Clone)]
pub struct PfKeyConfig {
    /// Directory the per-VRF sockets are bound under.
    pub socket_dir: PathBuf,
}

impl Default for PfKeyConfig {
    fn default() -> Self {
        PfKeyConfig {
            socket_dir: PathBuf::from("/var/tmp"),
        }
    }
}

impl PfKeyConfig {
    pub fn new(socket_dir: impl Into<PathBuf>) -> Self {
        PfKeyConfig {
            socket_dir: socket_dir.into(),
        }
    }
}

/// State shared by the handler and its spawned tasks.
struct Shared {
    name: VrfName,
    vrf_index: VrfIndex,
    mux_factory: Arc<dyn MsgMuxFactory>,
    conns: ConnTable,
}

/// Live listener state, present while the handler runs.
struct Active {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

/// Per-VRF PF_KEY listener relaying key-exchange traffic to a message
/// multiplexer.
///
/// Lifecycle: stopped → listening ([`start`](Self::start)) → stopped
/// ([`stop`](Self::stop)). Both transitions are no-ops when already in
/// the target state. Every spawned task is tracked; `stop` returns only
/// after the accept loop and all connection handlers have exited.
pub struct PfKeyHandler {
    shared: Arc<Shared>,
    sock_path: PathBuf,
    active: Mutex<Option<Active>>,
}

impl PfKeyHandler {
    pub fn new(
        name: VrfName,
        vrf_index: VrfIndex,
        config: &PfKeyConfig,
        mux_factory: Arc<dyn MsgMuxFactory>,
    ) -> Self {
        let sock_path = config.socket_dir.join(format!("pfkey-{name}.sock"));
        PfKeyHandler {
            shared: Arc::new(Shared {
                name,
                vrf_index,
                mux_factory,
                conns: ConnTable::new(),
            }),
            sock_path,
            active: Mutex::new(None),
        }
    }

    /// Creates a stopped handler serving `vrf`.
    pub fn for_vrf(vrf: &Vrf, config: &PfKeyConfig, mux_factory: Arc<dyn MsgMuxFactory>) -> Self {
        Self::new(vrf.name().clone(), vrf.index(), config, mux_factory)
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn socket_path(&self) -> &Path {
        &self.sock_path
    }

    pub fn is_running(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Number of currently tracked connections.
    pub fn connection_count(&self) -> usize {
        self.shared.conns.len()
    }

    /// Binds the listener and launches the accept loop.
    ///
    /// A stale socket file from an unclean shutdown is removed first.
    /// No-op when already running; a bind failure leaves the handler
    /// stopped. Must be called from within a Tokio runtime.
    pub fn start(&self) -> io::Result<()> {
        let mut active = self.lock_active();
        if active.is_some() {
            return Ok(());
        }

        let _ = std::fs::remove_file(&self.sock_path);
        let listener = UnixListener::bind(&self.sock_path)?;
        info!(vrf = %self.shared.name, socket = %self.sock_path.display(),
            "PF_KEY handler listening");

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(accept_loop(
            Arc::clone(&self.shared),
            listener,
            cancel.clone(),
            tracker.clone(),
        ));
        *active = Some(Active { cancel, tracker });
        Ok(())
    }

    /// Stops the handler and waits until the accept loop and every
    /// connection task have exited, then removes the socket file.
    /// No-op when not running.
    pub async fn stop(&self) {
        let Some(active) = self.lock_active().take() else {
            return;
        };
        info!(vrf = %self.shared.name, "stopping PF_KEY handler");

        active.cancel.cancel();
        active.tracker.close();
        active.tracker.wait().await;

        // final sweep for connections that never deregistered
        self.shared.conns.close_all();
        let _ = std::fs::remove_file(&self.sock_path);
    }
}

impl fmt::Display for PfKeyHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.shared.name.fmt(f)
    }
}

async fn accept_loop(
    shared: Arc<Shared>,
    listener: UnixListener,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    debug!(vrf = %shared.name, "accepted PF_KEY connection");
                    tracker.spawn(handle_conn(
                        Arc::clone(&shared),
                        stream,
                        cancel.child_token(),
                    ));
                }
                Err(e) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    error!(vrf = %shared.name, error = %e, "PF_KEY accept failed");
                }
            }
        }
    }
    // graceful shutdown: unblock connections still waiting in a read
    shared.conns.close_all();
}

async fn handle_conn(shared: Arc<Shared>, mut stream: UnixStream, token: CancellationToken) {
    let id = shared.conns.add(token.clone());
    let mut mux = shared.mux_factory.mux_for_vrf(shared.vrf_index);

    loop {
        tokio::select! {
            // expected shutdown; not worth logging
            _ = token.cancelled() => break,
            msg = read_message(&mut stream) => match msg {
                Ok(msg) => {
                    if let Err(e) = mux.relay(&msg) {
                        error!(vrf = %shared.name, error = %e, "PF_KEY relay failed");
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!(vrf = %shared.name, "PF_KEY peer closed the connection");
                    break;
                }
                Err(e) => {
                    error!(vrf = %shared.name, error = %e, "PF_KEY read failed");
                    break;
                }
            }
        }
    }

    shared.conns.close_and_remove(id);
    // the multiplexer is released with the connection
}
