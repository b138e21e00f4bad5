//! Registry of live PF_KEY connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

pub(crate) type ConnId = u64;

/// Tracks the cancellation handle of every live connection, so shutdown
/// can close connections that are still blocked in a read.
#[derive(Debug, Default)]
pub(crate) struct ConnTable {
    next_id: AtomicU64,
    conns: Mutex<HashMap<ConnId, CancellationToken>>,
}

impl ConnTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConnId, CancellationToken>> {
        self.conns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connection; returns its id.
    pub(crate) fn add(&self, token: CancellationToken) -> ConnId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().insert(id, token);
        id
    }

    /// Closes one connection and drops it from the table.
    pub(crate) fn close_and_remove(&self, id: ConnId) {
        if let Some(token) = self.lock().remove(&id) {
            token.cancel();
        }
    }

    /// Closes every tracked connection.
    pub(crate) fn close_all(&self) {
        for (_, token) in self.lock().drain() {
            token.cancel();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}
